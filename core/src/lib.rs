//! Blocking client core for a Gerrit-style code review REST API.
//!
//! # Overview
//! Turns logical calls ("get account", "get project") into authenticated
//! HTTP requests and decodes the answers, hiding three authentication
//! schemes and the `)]}'` response guard behind one call path.
//!
//! # Design
//! - `Client::connect` parses a connection string and, when it embeds
//!   credentials, probes Digest, Basic and Cookie in that order.
//! - Authenticated calls live under the `a/` path namespace; `Endpoint`
//!   handles the switch.
//! - Digest signs every request with a fresh challenge fetched by an
//!   unauthenticated probe.
//! - I/O goes through the `Transport` trait. `UreqTransport` is the real
//!   one; tests inject fakes.

pub mod auth;
pub mod bootstrap;
pub mod client;
pub mod digest;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod response;
mod services;
pub mod types;

pub use auth::{AuthScheme, Authentication, Credential};
pub use bootstrap::{parse_connection_string, ConnectError, InapplicableReason, ProbeOutcome};
pub use client::Client;
pub use digest::DigestChallenge;
pub use endpoint::{add_options, escape_segment, Endpoint};
pub use error::{ApiError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use response::{check_response, strip_magic_prefix, Destination, Response};
pub use types::{AccountInfo, ProjectDescriptionInput, ProjectInfo, ProjectOptions};
