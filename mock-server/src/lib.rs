//! In-memory stand-in for a Gerrit-style review service.
//!
//! Serves the few endpoints the client crate exercises, guarded by exactly
//! one authentication scheme per server instance. Authenticated endpoints
//! live under `/a/`, JSON bodies carry the `)]}'` guard line, and a failed
//! login answers 401 with the challenge the real service would send.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const REALM: &str = "Gerrit Code Review";
pub const VERSION: &str = "3.10.0";
const MAGIC_PREFIX: &str = ")]}'\n";

/// The one scheme a server instance accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Basic,
    Digest,
    Cookie,
}

impl AuthMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "basic" => Some(AuthMode::Basic),
            "digest" => Some(AuthMode::Digest),
            "cookie" => Some(AuthMode::Cookie),
            _ => None,
        }
    }
}

/// For Cookie mode `username` is the cookie name and `password` its value.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub mode: AuthMode,
    pub username: String,
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Digest,
            username: "admin".to_string(),
            password: "secret".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_account_id")]
    pub account_id: i64,
    pub name: String,
    pub username: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Project {
    fn new(name: &str) -> Self {
        Self {
            id: name.replace('/', "%2F"),
            name: name.to_string(),
            description: None,
        }
    }
}

#[derive(Deserialize)]
pub struct DescriptionInput {
    pub description: Option<String>,
}

pub struct AppState {
    config: ServerConfig,
    nonce: String,
    projects: RwLock<HashMap<String, Project>>,
}

pub type Shared = Arc<AppState>;

pub fn app(config: ServerConfig) -> Router {
    let projects = ["All-Projects", "plugin/delete-project"]
        .into_iter()
        .map(|name| (name.to_string(), Project::new(name)))
        .collect();
    let state = Arc::new(AppState {
        config,
        nonce: Uuid::new_v4().simple().to_string(),
        projects: RwLock::new(projects),
    });

    Router::new()
        .route("/a/accounts/self", get(own_account))
        .route("/config/server/version", get(version))
        .route("/a/config/server/version", get(version_authenticated))
        .route("/projects/{name}", get(get_project))
        .route("/a/projects/{name}", get(get_project_authenticated))
        .route(
            "/a/projects/{name}/description",
            get(get_description).put(set_description),
        )
        .route("/a/changes/{id}/revisions/{revision}/patch", get(get_patch))
        .route("/echo", post(echo))
        .route("/a/echo", post(echo_authenticated))
        .with_state(state)
}

pub async fn run(listener: TcpListener, config: ServerConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app(config)).await
}

/// A JSON body behind the XSSI guard line.
fn guarded_json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    let body = match serde_json::to_string(value) {
        Ok(json) => format!("{MAGIC_PREFIX}{json}"),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    (
        status,
        [(header::CONTENT_TYPE, "application/json; charset=UTF-8")],
        body,
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("Not found: {what}")).into_response()
}

async fn own_account(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &method, &uri, &headers) {
        return denied;
    }
    let account = Account {
        account_id: 1000000,
        name: "Administrator".to_string(),
        username: state.config.username.clone(),
    };
    guarded_json(StatusCode::OK, &account)
}

async fn version() -> Response {
    guarded_json(StatusCode::OK, &VERSION)
}

async fn version_authenticated(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &method, &uri, &headers) {
        return denied;
    }
    guarded_json(StatusCode::OK, &VERSION)
}

async fn get_project(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    let projects = state.projects.read().await;
    match projects.get(&name) {
        Some(project) => guarded_json(StatusCode::OK, project),
        None => not_found(&name),
    }
}

async fn get_project_authenticated(
    State(state): State<Shared>,
    Path(name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &method, &uri, &headers) {
        return denied;
    }
    get_project(State(state), Path(name)).await
}

async fn get_description(
    State(state): State<Shared>,
    Path(name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &method, &uri, &headers) {
        return denied;
    }
    let projects = state.projects.read().await;
    match projects.get(&name) {
        Some(project) => guarded_json(StatusCode::OK, &project.description.clone().unwrap_or_default()),
        None => not_found(&name),
    }
}

async fn set_description(
    State(state): State<Shared>,
    Path(name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(denied) = authorize(&state, &method, &uri, &headers) {
        return denied;
    }
    let input: DescriptionInput = match serde_json::from_slice(&body) {
        Ok(input) => input,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };
    let mut projects = state.projects.write().await;
    let Some(project) = projects.get_mut(&name) else {
        return not_found(&name);
    };
    project.description = input.description.filter(|d| !d.is_empty());
    match &project.description {
        Some(description) => guarded_json(StatusCode::OK, description),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Returns the JSON request body unchanged, behind the guard line.
async fn echo(body: Bytes) -> Response {
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(value) => guarded_json(StatusCode::OK, &value),
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}

async fn echo_authenticated(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(denied) = authorize(&state, &method, &uri, &headers) {
        return denied;
    }
    echo(body).await
}

/// Raw base64 patch; not JSON and not guarded.
async fn get_patch(
    State(state): State<Shared>,
    Path((id, revision)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &method, &uri, &headers) {
        return denied;
    }
    let patch = format!("From {revision}\nSubject: change {id}\n\n--- a/README\n+++ b/README\n");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=ISO-8859-1")],
        STANDARD.encode(patch),
    )
        .into_response()
}

/// Check the request against the server's single scheme, or build the 401.
#[allow(clippy::result_large_err)]
fn authorize(state: &AppState, method: &Method, uri: &Uri, headers: &HeaderMap) -> Result<(), Response> {
    let config = &state.config;
    let accepted = match config.mode {
        AuthMode::Basic => header_str(headers, header::AUTHORIZATION)
            .and_then(|value| value.strip_prefix("Basic "))
            .and_then(|token| STANDARD.decode(token.trim()).ok())
            .is_some_and(|decoded| decoded == format!("{}:{}", config.username, config.password).as_bytes()),
        AuthMode::Cookie => header_str(headers, header::COOKIE).is_some_and(|cookies| {
            cookies.split(';').any(|pair| {
                pair.trim().split_once('=')
                    == Some((config.username.as_str(), config.password.as_str()))
            })
        }),
        AuthMode::Digest => header_str(headers, header::AUTHORIZATION)
            .and_then(|value| value.strip_prefix("Digest "))
            .is_some_and(|params| digest_matches(state, method, uri, params)),
    };
    if accepted {
        return Ok(());
    }

    let mut denied = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    let challenge = match config.mode {
        AuthMode::Basic => Some(format!("Basic realm=\"{REALM}\"")),
        AuthMode::Digest => Some(format!(
            "Digest realm=\"{REALM}\", domain=\"/\", qop=\"auth\", nonce=\"{}\"",
            state.nonce
        )),
        AuthMode::Cookie => None,
    };
    if let Some(value) = challenge.and_then(|c| c.parse::<header::HeaderValue>().ok()) {
        denied.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    Err(denied)
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn digest_matches(state: &AppState, method: &Method, uri: &Uri, params: &str) -> bool {
    let params = parse_params(params);
    let param = |key: &str| params.get(key).map(String::as_str).unwrap_or_default();

    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or_else(|| uri.path());
    if param("username") != state.config.username
        || param("realm") != REALM
        || param("nonce") != state.nonce
        || param("uri") != target
    {
        return false;
    }

    let ha1 = md5_hex(&format!("{}:{REALM}:{}", state.config.username, state.config.password));
    let ha2 = md5_hex(&format!("{}:{}", method.as_str(), param("uri")));
    let expected = match param("qop") {
        "auth" => md5_hex(&format!(
            "{ha1}:{}:{}:{}:auth:{ha2}",
            state.nonce,
            param("nc"),
            param("cnonce")
        )),
        _ => md5_hex(&format!("{ha1}:{}:{ha2}", state.nonce)),
    };
    param("response") == expected
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// `k="v", k=v` into a map. Good enough for headers this client sends.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();
    while let Some((key, after)) = rest.split_once('=') {
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let after = after.trim_start();
        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            let mut value = String::new();
            let mut chars = quoted.char_indices();
            let mut end = quoted.len();
            while let Some((i, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        end = i + 1;
                        break;
                    }
                    other => value.push(other),
                }
            }
            (value, &quoted[end..])
        } else {
            let end = after.find(',').unwrap_or(after.len());
            (after[..end].trim().to_string(), &after[end..])
        };
        params.insert(key, value);
        rest = remainder.trim_start_matches([',', ' ']);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_serializes_with_encoded_id() {
        let json = serde_json::to_value(Project::new("plugin/delete-project")).unwrap();
        assert_eq!(json["id"], "plugin%2Fdelete-project");
        assert_eq!(json["name"], "plugin/delete-project");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn parses_digest_params() {
        let params = parse_params(
            r#"username="admin", realm="Gerrit Code Review", uri="/a/x?y=1,2", qop=auth, nc=00000001"#,
        );
        assert_eq!(params["username"], "admin");
        assert_eq!(params["realm"], "Gerrit Code Review");
        assert_eq!(params["uri"], "/a/x?y=1,2");
        assert_eq!(params["qop"], "auth");
        assert_eq!(params["nc"], "00000001");
    }

    #[test]
    fn auth_mode_names() {
        assert_eq!(AuthMode::parse("Digest"), Some(AuthMode::Digest));
        assert_eq!(AuthMode::parse("cookie"), Some(AuthMode::Cookie));
        assert_eq!(AuthMode::parse("ldap"), None);
    }

    #[test]
    fn description_input_accepts_missing_field() {
        let input: DescriptionInput = serde_json::from_str("{}").unwrap();
        assert!(input.description.is_none());
    }
}
