//! Turning a connection string into a ready client.
//!
//! # Design
//! A connection string may embed `name:secret`. The name alone does not say
//! which scheme the server expects, so each scheme is tried in turn against
//! the caller's own account. Every attempt yields a `ProbeOutcome`; the
//! loop stops at the first `Accepted` or `Fatal` and otherwise moves on.
//!
//! Digest goes first: against a Digest-only server a Basic or Cookie
//! attempt fails in a way that looks like bad credentials.

use percent_encoding::percent_decode_str;
use tracing::debug;
use url::Url;

use crate::auth::{AuthScheme, Credential};
use crate::client::Client;
use crate::endpoint::Endpoint;
use crate::error::ApiError;
use crate::http::{Transport, UreqTransport};

/// Schemes tried by `negotiate`, in order.
pub const PROBE_ORDER: [AuthScheme; 3] = [AuthScheme::Digest, AuthScheme::Basic, AuthScheme::Cookie];

/// Why a scheme was skipped during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InapplicableReason {
    /// The Digest probe got a 401 without `WWW-Authenticate`.
    ChallengeMissing,
    /// The Digest probe was challenged for another scheme.
    ChallengeNotDigest(String),
    /// The server rejected the credentials with 401.
    Unauthorized,
    /// The account lookup succeeded with a 2xx other than 200.
    UnexpectedStatus(u16),
    /// The credential cannot be sent as a cookie, e.g. an email address as
    /// the name or a secret with spaces.
    InvalidCookie,
}

/// Result of trying one scheme.
#[derive(Debug)]
pub enum ProbeOutcome {
    Accepted(AuthScheme),
    Inapplicable(InapplicableReason),
    /// Anything else; negotiation stops here.
    Fatal(ApiError),
}

impl ProbeOutcome {
    fn from_result(scheme: AuthScheme, result: Result<u16, ApiError>) -> Self {
        match result {
            Ok(200) => ProbeOutcome::Accepted(scheme),
            Ok(status) => ProbeOutcome::Inapplicable(InapplicableReason::UnexpectedStatus(status)),
            Err(ApiError::WwwAuthenticateMissing) => {
                ProbeOutcome::Inapplicable(InapplicableReason::ChallengeMissing)
            }
            Err(ApiError::WwwAuthenticateNotDigest(other)) => {
                ProbeOutcome::Inapplicable(InapplicableReason::ChallengeNotDigest(other))
            }
            Err(ApiError::Status { status: 401, .. }) => {
                ProbeOutcome::Inapplicable(InapplicableReason::Unauthorized)
            }
            Err(ApiError::InvalidCredential(_)) if scheme == AuthScheme::Cookie => {
                ProbeOutcome::Inapplicable(InapplicableReason::InvalidCookie)
            }
            Err(error) => ProbeOutcome::Fatal(error),
        }
    }
}

/// Failure from `Client::connect`.
///
/// Configuration errors happen before a client exists and carry none.
/// Negotiation failures hand the client back: after
/// `ApiError::AuthenticationFailed` it is anonymous and still usable.
pub struct ConnectError<T> {
    pub error: ApiError,
    pub client: Option<Client<T>>,
}

impl<T> ConnectError<T> {
    fn config(error: ApiError) -> Self {
        Self { error, client: None }
    }

    pub fn into_client(self) -> Option<Client<T>> {
        self.client
    }
}

impl<T> std::fmt::Debug for ConnectError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectError")
            .field("error", &self.error)
            .field("client", &self.client.is_some())
            .finish()
    }
}

impl<T> std::fmt::Display for ConnectError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl<T> std::error::Error for ConnectError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Split `scheme://[name:secret@]host[:port][/path]` into the endpoint and
/// the embedded credential.
///
/// The endpoint keeps scheme, host, port and path only, so credentials never
/// show up in request URLs.
pub fn parse_connection_string(input: &str) -> Result<(Endpoint, Option<Credential>), ApiError> {
    if input.is_empty() {
        return Err(ApiError::NoInstanceGiven);
    }

    let mut url = Url::parse(input)?;
    if url.cannot_be_a_base() {
        return Err(ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
    }

    let credential = if !url.username().is_empty() || url.password().is_some() {
        // `url` drops an empty password, so `user:@host` is told apart from
        // `user@host` by the separator in the raw input.
        let password = match url.password() {
            Some(password) => password,
            None if userinfo_has_password(input) => "",
            None => return Err(ApiError::UserWithoutPassword),
        };
        let credential = Credential::new(decode(url.username()), decode(password));
        if url.set_username("").is_err() || url.set_password(None).is_err() {
            return Err(ApiError::InvalidUrl(url::ParseError::EmptyHost));
        }
        Some(credential)
    } else {
        None
    };

    url.set_query(None);
    url.set_fragment(None);
    Ok((Endpoint::new(url), credential))
}

fn userinfo_has_password(input: &str) -> bool {
    let authority = input.split_once("://").map_or(input, |(_, rest)| rest);
    let authority = authority
        .find(['/', '?', '#'])
        .map_or(authority, |end| &authority[..end]);
    authority
        .rsplit_once('@')
        .is_some_and(|(userinfo, _)| userinfo.contains(':'))
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

impl Client<UreqTransport> {
    /// `connect_with` over a default `UreqTransport`.
    pub fn connect(connection: &str) -> Result<Self, ConnectError<UreqTransport>> {
        Self::connect_with(connection, UreqTransport::new())
    }
}

impl<T: Transport> Client<T> {
    /// Build a client from a connection string.
    ///
    /// Without embedded credentials the client is anonymous and no request
    /// is made. With them, `negotiate` picks the scheme.
    pub fn connect_with(connection: &str, transport: T) -> Result<Self, ConnectError<T>> {
        let (endpoint, credential) = parse_connection_string(connection).map_err(ConnectError::config)?;
        let mut client = Client::from_endpoint(endpoint, transport);

        let Some(credential) = credential else {
            return Ok(client);
        };
        match client.negotiate(credential) {
            Ok(_) => Ok(client),
            Err(error) => Err(ConnectError {
                error,
                client: Some(client),
            }),
        }
    }

    /// Try Digest, Basic and Cookie in turn with `credential`.
    ///
    /// Returns the accepted scheme, which stays active. When no scheme is
    /// accepted the client is reset to anonymous and
    /// `ApiError::AuthenticationFailed` is returned. A fatal probe error is
    /// returned as is, with the scheme that hit it still set.
    pub fn negotiate(&mut self, credential: Credential) -> Result<AuthScheme, ApiError> {
        for scheme in PROBE_ORDER {
            match self.probe(scheme, credential.clone()) {
                ProbeOutcome::Accepted(scheme) => {
                    debug!(%scheme, "credentials accepted");
                    return Ok(scheme);
                }
                ProbeOutcome::Inapplicable(reason) => {
                    debug!(%scheme, ?reason, "scheme not applicable");
                }
                ProbeOutcome::Fatal(error) => return Err(error),
            }
        }

        self.reset_auth();
        Err(ApiError::AuthenticationFailed)
    }

    /// Switch to `scheme` and check it by fetching the caller's own account.
    pub fn probe(&mut self, scheme: AuthScheme, credential: Credential) -> ProbeOutcome {
        self.authentication_mut().set(scheme, credential);
        debug!(%scheme, "probing credentials");
        let result = self.get_account("self").map(|(_, response)| response.status());
        ProbeOutcome::from_result(scheme, result)
    }
}
