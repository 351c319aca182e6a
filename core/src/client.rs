//! Authenticated request pipeline for the review service.
//!
//! # Design
//! `Client` owns the endpoint, the authentication state, and a `Transport`.
//! Every call goes through the same steps: resolve the URL for the current
//! auth state, encode the body, apply credentials, send, classify the
//! status, then hand the body to its `Destination`.
//!
//! Calls take `&self` and read the auth state once, when the request is
//! built. Changing it takes `&mut self`, so a single owner can never change
//! credentials under an in-flight call. A client shared between threads and
//! reconfigured at runtime needs a lock chosen by the caller; the intended
//! use is to settle authentication at connect time and leave it alone.

use std::io::Write;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::auth::{AuthScheme, Authentication};
use crate::endpoint::Endpoint;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, Transport, UreqTransport};
use crate::response::{check_response, strip_magic_prefix, Destination, Response};

/// Client for one review service instance.
#[derive(Debug, Clone)]
pub struct Client<T = UreqTransport> {
    endpoint: Endpoint,
    auth: Authentication,
    transport: T,
}

impl<T: Transport> Client<T> {
    /// An anonymous client. See `connect_with` for connection strings that
    /// carry credentials.
    pub fn from_endpoint(endpoint: Endpoint, transport: T) -> Self {
        Self {
            endpoint,
            auth: Authentication::None,
            transport,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn authentication(&self) -> &Authentication {
        &self.auth
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        self.auth.scheme()
    }

    pub fn set_basic_auth(&mut self, name: impl Into<String>, secret: impl Into<String>) {
        self.auth.set_basic(name, secret);
    }

    pub fn set_cookie_auth(&mut self, name: impl Into<String>, secret: impl Into<String>) {
        self.auth.set_cookie(name, secret);
    }

    pub fn set_digest_auth(&mut self, name: impl Into<String>, secret: impl Into<String>) {
        self.auth.set_digest(name, secret);
    }

    pub fn reset_auth(&mut self) {
        self.auth.reset();
    }

    pub(crate) fn authentication_mut(&mut self) -> &mut Authentication {
        &mut self.auth
    }

    /// Send one request and route a successful body into `destination`.
    ///
    /// On a non-2xx status the body is left unparsed and the response rides
    /// along in `ApiError::Status`.
    pub fn execute<B, D>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        destination: Destination<'_, D>,
    ) -> Result<Response, ApiError>
    where
        B: Serialize + ?Sized,
        D: DeserializeOwned,
    {
        let response = self.send(method, path, body)?;
        match destination {
            Destination::Discard => Ok(response),
            Destination::Raw(sink) => {
                let written = sink.write_all(response.body());
                match written {
                    Ok(()) => Ok(response),
                    Err(source) => Err(ApiError::Write {
                        source,
                        response: Box::new(response),
                    }),
                }
            }
            Destination::Typed(target) => {
                let (value, response) = decode(response)?;
                *target = value;
                Ok(response)
            }
        }
    }

    /// GET `path` and decode the JSON body.
    pub fn get<D: DeserializeOwned>(&self, path: &str) -> Result<(D, Response), ApiError> {
        decode(self.send::<()>(HttpMethod::Get, path, None)?)
    }

    /// GET `path` and copy the body into `sink` untouched.
    pub fn get_raw(&self, path: &str, sink: &mut dyn Write) -> Result<Response, ApiError> {
        self.execute::<(), ()>(HttpMethod::Get, path, None, Destination::Raw(sink))
    }

    /// GET an endpoint whose body is a single JSON string.
    pub fn get_string(&self, path: &str) -> Result<(String, Response), ApiError> {
        self.get(path)
    }

    pub fn post<B, D>(&self, path: &str, body: &B) -> Result<(D, Response), ApiError>
    where
        B: Serialize + ?Sized,
        D: DeserializeOwned,
    {
        decode(self.send(HttpMethod::Post, path, Some(body))?)
    }

    pub fn put<B, D>(&self, path: &str, body: &B) -> Result<(D, Response), ApiError>
    where
        B: Serialize + ?Sized,
        D: DeserializeOwned,
    {
        decode(self.send(HttpMethod::Put, path, Some(body))?)
    }

    /// DELETE `path`, ignoring any body in the answer.
    pub fn delete(&self, path: &str) -> Result<Response, ApiError> {
        self.send::<()>(HttpMethod::Delete, path, None)
    }

    pub fn delete_with_body<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        self.send(HttpMethod::Delete, path, Some(body))
    }

    fn send<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let request = self.build_request(method, path, body)?;
        debug!(
            method = method.as_str(),
            url = %request.url,
            scheme = %self.auth.scheme(),
            "sending request"
        );
        let http = self.transport.execute(&request)?;
        debug!(url = %request.url, status = http.status, "received response");
        check_response(&request.url, http)
    }

    /// Build a ready-to-send request, Digest probe included.
    fn build_request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
    ) -> Result<HttpRequest, ApiError> {
        let auth = &self.auth;
        let url = self.endpoint.request_url(auth.has_auth(), path)?;
        let mut request = HttpRequest::new(method, url.as_str());
        if let Some(body) = body {
            request.body = Some(serde_json::to_vec(body).map_err(ApiError::Serialization)?);
        }

        auth.apply(&mut request, &self.transport)?;

        // Compact JSON; Content-Type is sent even without a body.
        request.set_header("Accept", "application/json");
        request.set_header("Content-Type", "application/json");
        Ok(request)
    }
}

fn decode<D: DeserializeOwned>(response: Response) -> Result<(D, Response), ApiError> {
    let parsed: Result<D, _> = serde_json::from_slice(strip_magic_prefix(response.body()));
    match parsed {
        Ok(value) => Ok((value, response)),
        Err(source) => Err(ApiError::Decode {
            source,
            response: Box::new(response),
        }),
    }
}
