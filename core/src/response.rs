//! Response handling: the XSSI guard, status classification, and where a
//! successful body ends up.

use std::io::Write;

use crate::error::ApiError;
use crate::http::HttpResponse;

/// Anti-hijacking line the service puts in front of JSON bodies.
pub const MAGIC_PREFIX: &[u8] = b")]}'\n";

/// Remove the `)]}'` guard line from the front of `body`, if present.
///
/// Only the first line is a candidate; anything else is returned untouched.
pub fn strip_magic_prefix(body: &[u8]) -> &[u8] {
    body.strip_prefix(MAGIC_PREFIX).unwrap_or(body)
}

/// Map a status outside 200–299 to `ApiError::Status`.
///
/// The body is never looked at: error responses from the service carry
/// plain text at best, so the status line is the whole story.
pub fn check_response(url: &str, response: HttpResponse) -> Result<Response, ApiError> {
    let response = Response::new(url.to_string(), response);
    if (200..=299).contains(&response.status()) {
        return Ok(response);
    }
    Err(ApiError::Status {
        url: url.to_string(),
        status: response.status(),
        status_line: response.status_line(),
        response: Box::new(response),
    })
}

/// A response paired with the URL that produced it.
///
/// Returned by every pipeline call, and carried inside the errors raised
/// after the server answered.
#[derive(Debug, Clone)]
pub struct Response {
    url: String,
    http: HttpResponse,
}

impl Response {
    pub fn new(url: String, http: HttpResponse) -> Self {
        Self { url, http }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.http.status
    }

    pub fn status_line(&self) -> String {
        self.http.status_line()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.http.header(name)
    }

    /// The body exactly as received, guard line included.
    pub fn body(&self) -> &[u8] {
        &self.http.body
    }

    pub fn into_http(self) -> HttpResponse {
        self.http
    }
}

/// Where a successful response body goes.
pub enum Destination<'a, T> {
    /// Ignore the body.
    Discard,
    /// Copy the body verbatim, without prefix stripping or JSON parsing.
    Raw(&'a mut dyn Write),
    /// Strip the guard line and decode JSON into the target.
    Typed(&'a mut T),
}
