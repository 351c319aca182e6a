//! Request URL construction.
//!
//! # Design
//! The service serves the same resource under two namespaces: `/<path>` for
//! anonymous access and `/a/<path>` for authenticated access. `Endpoint`
//! owns the normalized base URL and decides which namespace a call lands in.
//!
//! Path segments that may contain `/` (project names such as
//! `plugin/delete-project`) must go through `escape_segment` before being
//! formatted into a path. Joining preserves existing escapes, so `%2F`
//! reaches the server intact instead of turning into a segment boundary.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use url::Url;

use crate::error::ApiError;

/// Namespace prefix for authenticated requests.
pub const AUTH_PREFIX: &str = "a/";

/// Characters escaped inside a single path segment. Everything outside the
/// RFC 3986 unreserved set, so `/`, `?`, `#` and `%` never leak structure.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'!')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Base URL of a review service instance, always ending in `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    pub fn parse(base: &str) -> Result<Self, ApiError> {
        Ok(Self::new(Url::parse(base)?))
    }

    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base }
    }

    pub fn as_url(&self) -> &Url {
        &self.base
    }

    /// Resolve `path` against the base.
    ///
    /// Leading `/`s are dropped, so the path always stays below the base.
    /// When `authenticated` is set the path is moved under `a/` unless it is
    /// already there.
    pub fn request_url(&self, authenticated: bool, path: &str) -> Result<Url, ApiError> {
        let path = path.trim_start_matches('/');
        let joined = if authenticated && !path.starts_with(AUTH_PREFIX) {
            self.base.join(&format!("{AUTH_PREFIX}{path}"))?
        } else {
            self.base.join(path)?
        };
        Ok(joined)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.base.fmt(f)
    }
}

/// Percent-encode one path segment, `/` included.
pub fn escape_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Replace the query string of `path` with the fields of `options`.
///
/// `options` must serialize to a flat map; keys come out sorted. `null`
/// fields are skipped and sequences become repeated keys, which is how list
/// queries pass several `o=` or `q=` parameters. `None` returns `path`
/// unchanged.
pub fn add_options<O: Serialize + ?Sized>(path: &str, options: Option<&O>) -> Result<String, ApiError> {
    let Some(options) = options else {
        return Ok(path.to_string());
    };

    let value = serde_json::to_value(options).map_err(ApiError::Serialization)?;
    let serde_json::Value::Object(fields) = value else {
        return Err(ApiError::Serialization(serde::ser::Error::custom(
            "query options must serialize to a map",
        )));
    };

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &fields {
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    if let Some(text) = query_text(item) {
                        query.append_pair(key, &text);
                    }
                }
            }
            other => {
                if let Some(text) = query_text(other) {
                    query.append_pair(key, &text);
                }
            }
        }
    }

    let base = path.split_once('?').map_or(path, |(base, _)| base);
    let query = query.finish();
    if query.is_empty() {
        Ok(base.to_string())
    } else {
        Ok(format!("{base}?{query}"))
    }
}

fn query_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
