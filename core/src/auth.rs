//! Authentication state and per-request application.
//!
//! # Design
//! `Authentication` is a closed enum, so a client holds at most one scheme
//! with exactly one credential. Switching schemes replaces the credential.
//!
//! Basic and Cookie are static headers. Digest needs the server's nonce, so
//! `apply` sends an unauthenticated probe with the same method and URL,
//! reads the challenge from the 401, and signs the real request with it.
//! No nonce is reused, which costs one extra round-trip per request.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};
use url::Url;

use crate::digest::DigestChallenge;
use crate::error::ApiError;
use crate::http::{HttpRequest, Transport};

/// The authentication scheme a client is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    Basic,
    Cookie,
    Digest,
}

impl std::fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthScheme::None => "none",
            AuthScheme::Basic => "basic",
            AuthScheme::Cookie => "cookie",
            AuthScheme::Digest => "digest",
        };
        f.write_str(name)
    }
}

/// A name/secret pair: user and password for Basic and Digest, cookie name
/// and value for Cookie.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    name: String,
    secret: String,
}

impl Credential {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The active scheme together with its credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Authentication {
    #[default]
    None,
    Basic(Credential),
    Cookie(Credential),
    Digest(Credential),
}

impl Authentication {
    pub fn set_basic(&mut self, name: impl Into<String>, secret: impl Into<String>) {
        *self = Authentication::Basic(Credential::new(name, secret));
    }

    pub fn set_cookie(&mut self, name: impl Into<String>, secret: impl Into<String>) {
        *self = Authentication::Cookie(Credential::new(name, secret));
    }

    pub fn set_digest(&mut self, name: impl Into<String>, secret: impl Into<String>) {
        *self = Authentication::Digest(Credential::new(name, secret));
    }

    /// Switch to `scheme` with `credential`. `AuthScheme::None` resets.
    pub fn set(&mut self, scheme: AuthScheme, credential: Credential) {
        *self = match scheme {
            AuthScheme::None => Authentication::None,
            AuthScheme::Basic => Authentication::Basic(credential),
            AuthScheme::Cookie => Authentication::Cookie(credential),
            AuthScheme::Digest => Authentication::Digest(credential),
        };
    }

    pub fn reset(&mut self) {
        *self = Authentication::None;
    }

    pub fn scheme(&self) -> AuthScheme {
        match self {
            Authentication::None => AuthScheme::None,
            Authentication::Basic(_) => AuthScheme::Basic,
            Authentication::Cookie(_) => AuthScheme::Cookie,
            Authentication::Digest(_) => AuthScheme::Digest,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Authentication::None => None,
            Authentication::Basic(c) | Authentication::Cookie(c) | Authentication::Digest(c) => Some(c),
        }
    }

    pub fn has_auth(&self) -> bool {
        !matches!(self, Authentication::None)
    }

    pub fn has_basic(&self) -> bool {
        matches!(self, Authentication::Basic(_))
    }

    pub fn has_cookie(&self) -> bool {
        matches!(self, Authentication::Cookie(_))
    }

    pub fn has_digest(&self) -> bool {
        matches!(self, Authentication::Digest(_))
    }

    /// Add credentials to `request`.
    ///
    /// For Digest this performs the challenge round-trip through `transport`.
    /// A probe that answers with anything but 401 carries no challenge, and
    /// `request` is left unauthenticated.
    pub fn apply<T: Transport + ?Sized>(&self, request: &mut HttpRequest, transport: &T) -> Result<(), ApiError> {
        match self {
            Authentication::None => Ok(()),
            Authentication::Basic(credential) => {
                let token = STANDARD.encode(format!("{}:{}", credential.name, credential.secret));
                request.set_header("Authorization", format!("Basic {token}"));
                Ok(())
            }
            Authentication::Cookie(credential) => {
                validate_cookie(credential)?;
                request.set_header("Cookie", format!("{}={}", credential.name, credential.secret));
                Ok(())
            }
            Authentication::Digest(credential) => apply_digest(credential, request, transport),
        }
    }
}

fn apply_digest<T: Transport + ?Sized>(
    credential: &Credential,
    request: &mut HttpRequest,
    transport: &T,
) -> Result<(), ApiError> {
    let mut probe = HttpRequest::new(request.method, request.url.clone());
    probe.set_header("Accept", "*/*");
    probe.set_header("Content-Type", "application/json");

    debug!(method = request.method.as_str(), url = %request.url, "requesting digest challenge");
    let response = transport.execute(&probe)?;

    if response.status != 401 {
        warn!(
            url = %request.url,
            status = response.status,
            "digest probe returned no challenge; sending request without credentials"
        );
        return Ok(());
    }

    let challenge = DigestChallenge::from_headers(response.header_values("WWW-Authenticate"))?;
    let uri = request_target(&request.url)?;
    let cnonce = uuid::Uuid::new_v4().simple().to_string();
    let authorization = challenge.authorization(credential, request.method.as_str(), &uri, &cnonce);
    request.set_header("Authorization", authorization);
    Ok(())
}

/// Path plus query of `url`, as it appears on the request line.
fn request_target(url: &str) -> Result<String, ApiError> {
    let url = Url::parse(url)?;
    Ok(match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    })
}

fn validate_cookie(credential: &Credential) -> Result<(), ApiError> {
    const SEPARATORS: &str = "()<>@,;:\\\"/[]?={} \t";
    let name_ok = !credential.name.is_empty()
        && credential
            .name
            .chars()
            .all(|c| c.is_ascii() && !c.is_ascii_control() && !SEPARATORS.contains(c));
    if !name_ok {
        return Err(ApiError::InvalidCredential(format!(
            "\"{}\" is not a valid cookie name",
            credential.name
        )));
    }
    let value_ok = credential
        .secret
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && !matches!(c, ';' | ',' | ' ' | '"' | '\\'));
    if !value_ok {
        return Err(ApiError::InvalidCredential(format!(
            "value of cookie \"{}\" contains characters not allowed in a cookie",
            credential.name
        )));
    }
    Ok(())
}
