use axum::http::{self, header, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};
use http_body_util::BodyExt;
use md5::{Digest, Md5};
use mock_server::{app, AuthMode, Project, ServerConfig, REALM, VERSION};
use tower::ServiceExt;

const PREFIX: &[u8] = b")]}'\n";

fn server(mode: AuthMode) -> Router {
    app(ServerConfig {
        mode,
        ..ServerConfig::default()
    })
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Decode a guarded JSON body, failing if the guard line is missing.
async fn guarded_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body_bytes(response).await;
    let json = bytes.strip_prefix(PREFIX).expect("missing )]}' guard");
    serde_json::from_slice(json).unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn get_with(uri: &str, name: http::HeaderName, value: &str) -> Request<String> {
    Request::builder()
        .uri(uri)
        .header(name, value)
        .body(String::new())
        .unwrap()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

fn nonce_from(challenge: &str) -> String {
    let start = challenge.find("nonce=\"").unwrap() + "nonce=\"".len();
    let end = challenge[start..].find('"').unwrap();
    challenge[start..start + end].to_string()
}

fn digest_header(method: &str, uri: &str, nonce: &str, password: &str) -> String {
    let ha1 = md5_hex(&format!("admin:{REALM}:{password}"));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    let response = md5_hex(&format!("{ha1}:{nonce}:00000001:abcdef:auth:{ha2}"));
    format!(
        "Digest username=\"admin\", realm=\"{REALM}\", nonce=\"{nonce}\", uri=\"{uri}\", \
         response=\"{response}\", qop=auth, nc=00000001, cnonce=\"abcdef\""
    )
}

// --- anonymous ---

#[tokio::test]
async fn version_is_guarded_json_string() {
    let resp = server(AuthMode::Digest)
        .oneshot(get("/config/server/version"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let version: String = guarded_json(resp).await;
    assert_eq!(version, VERSION);
}

#[tokio::test]
async fn project_name_with_encoded_slash() {
    let resp = server(AuthMode::Digest)
        .oneshot(get("/projects/plugin%2Fdelete-project"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let project: Project = guarded_json(resp).await;
    assert_eq!(project.name, "plugin/delete-project");
    assert_eq!(project.id, "plugin%2Fdelete-project");
}

#[tokio::test]
async fn unknown_project_is_404() {
    let resp = server(AuthMode::Digest)
        .oneshot(get("/projects/missing"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(resp).await, "Not found: missing");
}

// --- digest ---

#[tokio::test]
async fn digest_challenge_on_missing_credentials() {
    let resp = server(AuthMode::Digest)
        .oneshot(get("/a/accounts/self"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenge = resp.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
    assert!(challenge.starts_with("Digest realm=\"Gerrit Code Review\""));
    assert!(challenge.contains("qop=\"auth\""));
}

#[tokio::test]
async fn digest_round_trip() {
    let app = server(AuthMode::Digest);
    let resp = app.clone().oneshot(get("/a/accounts/self")).await.unwrap();
    let nonce = nonce_from(resp.headers()[header::WWW_AUTHENTICATE].to_str().unwrap());

    let authorization = digest_header("GET", "/a/accounts/self", &nonce, "secret");
    let resp = app
        .oneshot(get_with("/a/accounts/self", header::AUTHORIZATION, &authorization))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let account: serde_json::Value = guarded_json(resp).await;
    assert_eq!(account["username"], "admin");
    assert_eq!(account["_account_id"], 1000000);
}

#[tokio::test]
async fn digest_with_wrong_password() {
    let app = server(AuthMode::Digest);
    let resp = app.clone().oneshot(get("/a/accounts/self")).await.unwrap();
    let nonce = nonce_from(resp.headers()[header::WWW_AUTHENTICATE].to_str().unwrap());

    let authorization = digest_header("GET", "/a/accounts/self", &nonce, "wrong");
    let resp = app
        .oneshot(get_with("/a/accounts/self", header::AUTHORIZATION, &authorization))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn digest_bound_to_uri() {
    let app = server(AuthMode::Digest);
    let resp = app.clone().oneshot(get("/a/accounts/self")).await.unwrap();
    let nonce = nonce_from(resp.headers()[header::WWW_AUTHENTICATE].to_str().unwrap());

    // Signed for another resource.
    let authorization = digest_header("GET", "/a/config/server/version", &nonce, "secret");
    let resp = app
        .oneshot(get_with("/a/accounts/self", header::AUTHORIZATION, &authorization))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- basic ---

#[tokio::test]
async fn basic_accepts_matching_credentials() {
    let token = format!("Basic {}", STANDARD.encode("admin:secret"));
    let resp = server(AuthMode::Basic)
        .oneshot(get_with("/a/accounts/self", header::AUTHORIZATION, &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn basic_challenge_names_basic() {
    let token = format!("Basic {}", STANDARD.encode("admin:wrong"));
    let resp = server(AuthMode::Basic)
        .oneshot(get_with("/a/accounts/self", header::AUTHORIZATION, &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers()[header::WWW_AUTHENTICATE],
        "Basic realm=\"Gerrit Code Review\""
    );
}

// --- cookie ---

#[tokio::test]
async fn cookie_rejection_has_no_challenge() {
    let resp = server(AuthMode::Cookie)
        .oneshot(get("/a/accounts/self"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_none());
}

#[tokio::test]
async fn cookie_accepted_among_others() {
    let resp = server(AuthMode::Cookie)
        .oneshot(get_with(
            "/a/accounts/self",
            header::COOKIE,
            "theme=dark; admin=secret",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// --- description ---

#[tokio::test]
async fn description_is_stored_and_echoed() {
    let app = server(AuthMode::Basic);
    let token = format!("Basic {}", STANDARD.encode("admin:secret"));
    let put = Request::builder()
        .method("PUT")
        .uri("/a/projects/plugin%2Fdelete-project/description")
        .header(header::AUTHORIZATION, &token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(r#"{"description":"Deletes projects"}"#.to_string())
        .unwrap();
    let resp = app.clone().oneshot(put).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let echoed: String = guarded_json(resp).await;
    assert_eq!(echoed, "Deletes projects");

    let resp = app
        .oneshot(get("/projects/plugin%2Fdelete-project"))
        .await
        .unwrap();
    let project: Project = guarded_json(resp).await;
    assert_eq!(project.description.as_deref(), Some("Deletes projects"));
}

#[tokio::test]
async fn patch_is_plain_base64() {
    let token = format!("Basic {}", STANDARD.encode("admin:secret"));
    let resp = server(AuthMode::Basic)
        .oneshot(get_with(
            "/a/changes/42/revisions/current/patch",
            header::AUTHORIZATION,
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert!(!body.starts_with(PREFIX));
    let patch = String::from_utf8(STANDARD.decode(&body).unwrap()).unwrap();
    assert!(patch.contains("change 42"));
}

// --- echo ---

#[tokio::test]
async fn echo_returns_body_behind_guard() {
    let app = server(AuthMode::Basic);
    let body = r#"{"name":"x","count":3}"#;

    let anonymous = Request::builder()
        .method("POST")
        .uri("/echo")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap();
    let resp = app.clone().oneshot(anonymous).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let echoed: serde_json::Value = guarded_json(resp).await;
    assert_eq!(echoed, serde_json::json!({"name": "x", "count": 3}));

    // The authenticated variant is guarded like every other /a/ route.
    let unsigned = Request::builder()
        .method("POST")
        .uri("/a/echo")
        .body(String::new())
        .unwrap();
    let resp = app.oneshot(unsigned).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
