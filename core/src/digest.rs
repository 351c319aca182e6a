//! HTTP Digest authentication (RFC 2617 / RFC 2069).
//!
//! # Design
//! Pure functions only: parse a `WWW-Authenticate` challenge and compute the
//! matching `Authorization` value. The round-trip that fetches the challenge
//! lives in `auth`. Nothing here is cached between requests; every request
//! gets a fresh challenge, so the nonce count is always `00000001`.
//!
//! Supported: `algorithm` MD5 (the default) and MD5-sess, `qop=auth` when the
//! server offers it, and the legacy form without `qop` when it does not.
//! `qop=auth-int` alone is rejected.

use md5::{Digest, Md5};

use crate::auth::Credential;
use crate::error::ApiError;

const NONCE_COUNT: &str = "00000001";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Md5Sess,
}

impl Algorithm {
    fn as_str(self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Md5Sess => "MD5-sess",
        }
    }
}

/// The parts of a Digest challenge needed to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: Algorithm,
    /// Whether `qop=auth` is used in the answer.
    pub qop_auth: bool,
}

impl DigestChallenge {
    /// Pick the Digest challenge out of the `WWW-Authenticate` values of a 401.
    ///
    /// No values at all is `WwwAuthenticateMissing`; values that all name
    /// another scheme is `WwwAuthenticateNotDigest` with the first scheme seen.
    pub fn from_headers<'a>(values: impl IntoIterator<Item = &'a str>) -> Result<Self, ApiError> {
        let mut other_scheme = None;
        for value in values {
            let value = value.trim();
            let (scheme, params) = value.split_once(' ').unwrap_or((value, ""));
            if scheme.eq_ignore_ascii_case("Digest") {
                return Self::parse_params(params);
            }
            other_scheme.get_or_insert_with(|| scheme.to_string());
        }
        match other_scheme {
            Some(scheme) => Err(ApiError::WwwAuthenticateNotDigest(scheme)),
            None => Err(ApiError::WwwAuthenticateMissing),
        }
    }

    /// Parse the parameter list that follows `Digest `.
    pub fn parse_params(params: &str) -> Result<Self, ApiError> {
        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut algorithm = Algorithm::Md5;
        let mut qop = None;

        for (key, value) in split_params(params)? {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => qop = Some(value),
                "algorithm" => {
                    algorithm = if value.eq_ignore_ascii_case("MD5") {
                        Algorithm::Md5
                    } else if value.eq_ignore_ascii_case("MD5-sess") {
                        Algorithm::Md5Sess
                    } else {
                        return Err(ApiError::UnsupportedDigestAlgorithm(value));
                    };
                }
                _ => {}
            }
        }

        let qop_auth = match qop {
            None => false,
            Some(options) => {
                if options.split(',').any(|o| o.trim().eq_ignore_ascii_case("auth")) {
                    true
                } else {
                    return Err(ApiError::InvalidDigestChallenge(format!(
                        "unsupported qop \"{options}\""
                    )));
                }
            }
        };

        Ok(Self {
            realm: realm.ok_or_else(|| ApiError::InvalidDigestChallenge("missing realm".to_string()))?,
            nonce: nonce.ok_or_else(|| ApiError::InvalidDigestChallenge("missing nonce".to_string()))?,
            opaque,
            algorithm,
            qop_auth,
        })
    }

    /// Compute the `Authorization` header value for one request.
    ///
    /// `uri` is the request target (path and query) exactly as sent.
    /// `cnonce` is only used when `qop=auth` or MD5-sess is in play.
    pub fn authorization(&self, credential: &Credential, method: &str, uri: &str, cnonce: &str) -> String {
        let mut ha1 = md5_hex(&format!("{}:{}:{}", credential.name(), self.realm, credential.secret()));
        if self.algorithm == Algorithm::Md5Sess {
            ha1 = md5_hex(&format!("{ha1}:{}:{cnonce}", self.nonce));
        }
        let ha2 = md5_hex(&format!("{method}:{uri}"));

        let response = if self.qop_auth {
            md5_hex(&format!("{ha1}:{}:{NONCE_COUNT}:{cnonce}:auth:{ha2}", self.nonce))
        } else {
            md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{response}\", algorithm={}",
            quote(credential.name()),
            quote(&self.realm),
            quote(&self.nonce),
            quote(uri),
            self.algorithm.as_str(),
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{}\"", quote(opaque)));
        }
        if self.qop_auth {
            header.push_str(&format!(", qop=auth, nc={NONCE_COUNT}, cnonce=\"{}\"", quote(cnonce)));
        }
        header
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Split `k=v, k="quoted, value"` into pairs, unescaping quoted strings.
fn split_params(input: &str) -> Result<Vec<(String, String)>, ApiError> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            return Ok(params);
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(ApiError::InvalidDigestChallenge(format!(
                "parameter \"{key}\" has no value"
            )));
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(ApiError::InvalidDigestChallenge(format!(
                    "unterminated value for \"{key}\""
                )));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value.truncate(value.trim_end().len());
        }
        params.push((key, value));
    }
}
