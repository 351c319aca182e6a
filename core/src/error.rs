//! Error types for the review-service client.
//!
//! # Design
//! One `ApiError` enum covers every failure a call can surface. Variants that
//! happen after a response arrived (`Status`, `Decode`, `Write`) keep that
//! response so callers can still inspect status and headers.
//!
//! `WwwAuthenticateMissing` and `WwwAuthenticateNotDigest` are the two
//! "this scheme does not apply" signals. Bootstrap turns them into a probe
//! outcome instead of a failure; on an ordinary call they are plain errors.

use thiserror::Error;

use crate::response::Response;

/// Errors returned by `Client` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The connection string was empty.
    #[error("no review service instance given")]
    NoInstanceGiven,

    /// The connection string named a user but carried no password.
    #[error("a username was provided without a password")]
    UserWithoutPassword,

    /// None of Digest, Basic or Cookie authentication accepted the credentials.
    #[error("failed to authenticate using the provided credentials")]
    AuthenticationFailed,

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The stored credential cannot be expressed in the active scheme.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// A Digest probe got 401 without a `WWW-Authenticate` header.
    #[error("WWW-Authenticate header is missing")]
    WwwAuthenticateMissing,

    /// A Digest probe got 401 with a challenge for another scheme.
    #[error("WWW-Authenticate header type is not Digest (got {0})")]
    WwwAuthenticateNotDigest(String),

    #[error("invalid Digest challenge: {0}")]
    InvalidDigestChallenge(String),

    #[error("unsupported Digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),

    /// The request payload or options could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered outside 200–299.
    #[error("API call to {url} failed: {status_line}")]
    Status {
        url: String,
        status: u16,
        status_line: String,
        response: Box<Response>,
    },

    /// A 2xx body could not be decoded into the destination.
    #[error("deserialization failed: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        response: Box<Response>,
    },

    /// Copying a raw body into the caller's sink failed.
    #[error("writing response body failed: {source}")]
    Write {
        #[source]
        source: std::io::Error,
        response: Box<Response>,
    },
}

impl ApiError {
    /// The response that accompanied this error, if the server answered.
    pub fn response(&self) -> Option<&Response> {
        match self {
            ApiError::Status { response, .. }
            | ApiError::Decode { response, .. }
            | ApiError::Write { response, .. } => Some(&**response),
            _ => None,
        }
    }

    /// HTTP status of the accompanying response, if any.
    pub fn status(&self) -> Option<u16> {
        self.response().map(Response::status)
    }
}

/// A failure that left no HTTP response behind.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP transport failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("connection failed: {0}")]
    Connection(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;

    fn response(status: u16) -> Box<Response> {
        Box::new(Response::new(
            "http://localhost/a/x".to_string(),
            HttpResponse {
                status,
                reason: "Forbidden".to_string(),
                headers: Vec::new(),
                body: Vec::new(),
            },
        ))
    }

    #[test]
    fn status_error_message_names_url_and_status() {
        let err = ApiError::Status {
            url: "http://localhost/a/x".to_string(),
            status: 403,
            status_line: "403 Forbidden".to_string(),
            response: response(403),
        };
        assert_eq!(
            err.to_string(),
            "API call to http://localhost/a/x failed: 403 Forbidden"
        );
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn configuration_errors_carry_no_response() {
        assert!(ApiError::NoInstanceGiven.response().is_none());
        assert!(ApiError::UserWithoutPassword.status().is_none());
    }

    #[test]
    fn transport_error_is_transparent() {
        let err = ApiError::from(TransportError::Connection("refused".to_string()));
        assert_eq!(err.to_string(), "connection failed: refused");
    }
}
