//! Error types for operation calls.
//!
//! Every failure a caller can observe maps onto one member of a closed set:
//! HTTP, network, parse and cancellation failures are delivered through the
//! call's [`Callback`](crate::Callback), while configuration and illegal-state
//! errors are returned synchronously because no call could ever run with them.

use http::{HeaderMap, StatusCode};

use crate::transport::TransportError;

/// The raw transport response attached to an [`HttpFailure`].
///
/// It is released when dropped, so it stays readable for as long as the
/// failure that carries it is alive, including inside
/// [`Callback::on_failure`](crate::Callback::on_failure).
#[derive(Debug)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The raw response body.
    pub body: String,
}

impl RawResponse {
    /// Releases the transport response now instead of at the end of scope.
    pub fn close(self) {}
}

impl Drop for RawResponse {
    fn drop(&mut self) {
        tracing::trace!(status = self.status.as_u16(), "Released raw transport response");
    }
}

/// The transport returned a non-2xx response.
#[derive(thiserror::Error, Debug)]
#[error("HTTP error {status}: {message}")]
pub struct HttpFailure {
    status: StatusCode,
    message: String,
    raw_response: Option<RawResponse>,
}

impl HttpFailure {
    /// Creates a new `HttpFailure` carrying the raw transport response.
    pub fn new(raw_response: RawResponse) -> Self {
        let status = raw_response.status;
        Self {
            status,
            message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            raw_response: Some(raw_response),
        }
    }

    /// The HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The HTTP status message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw transport response, unless it was already taken.
    pub fn raw_response(&self) -> Option<&RawResponse> {
        self.raw_response.as_ref()
    }

    /// Takes ownership of the raw transport response.
    pub fn take_raw_response(&mut self) -> Option<RawResponse> {
        self.raw_response.take()
    }
}

/// The transport could not complete the exchange at all.
#[derive(thiserror::Error, Debug)]
#[error("Network error: {message}")]
pub struct NetworkFailure {
    message: String,
    #[source]
    source: Option<TransportError>,
}

impl NetworkFailure {
    /// Creates a `NetworkFailure` with no underlying transport error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The transport error that caused this failure, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        self.source.as_ref()
    }
}

impl From<TransportError> for NetworkFailure {
    fn from(error: TransportError) -> Self {
        Self {
            message: error.to_string(),
            source: Some(error),
        }
    }
}

/// The transport succeeded but the payload could not be decoded.
///
/// The raw payload and the serde message are preserved for debugging.
#[derive(thiserror::Error, Debug)]
#[error("Failed to parse response: {serde_error}")]
pub struct ParseFailure {
    /// The raw payload that failed to parse.
    pub raw_response: String,
    /// The serde error message.
    pub serde_error: String,
    /// The HTTP status code, when the payload came from the network.
    pub status: Option<StatusCode>,
}

/// The call was canceled before a terminal response could be produced.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Call for operation {operation} was canceled")]
pub struct CanceledFailure {
    operation: String,
}

impl CanceledFailure {
    /// Creates a `CanceledFailure` for the named operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// The name of the canceled operation.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// The main error type for operation calls.
///
/// # Examples
///
/// ```
/// use graphcall::{Error, NetworkFailure};
///
/// let err = Error::from(NetworkFailure::new("connection refused"));
/// assert!(err.is_retryable());
/// assert!(err.status().is_none());
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The server returned a non-2xx HTTP status code.
    #[error(transparent)]
    Http(#[from] HttpFailure),

    /// A connection, DNS or timeout failure at the transport level.
    #[error(transparent)]
    Network(#[from] NetworkFailure),

    /// The response payload could not be decoded into the expected shape.
    #[error(transparent)]
    Parse(#[from] ParseFailure),

    /// The call was canceled.
    #[error(transparent)]
    Canceled(#[from] CanceledFailure),

    /// Invalid client configuration. Returned synchronously from the builder.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid server URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The call was used outside of its lifecycle, e.g. enqueued twice.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The normalized cache failed to read, write or clear a record.
    #[error("Cache error: {0}")]
    Cache(String),
}

impl Error {
    /// Returns `true` if a fresh call for the same operation may succeed.
    ///
    /// Network failures and 5xx/429 HTTP failures are retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Http(failure) => {
                failure.status.is_server_error() || failure.status == StatusCode::TOO_MANY_REQUESTS
            }
            Error::Parse(_)
            | Error::Canceled(_)
            | Error::Configuration(_)
            | Error::InvalidUrl(_)
            | Error::IllegalState(_)
            | Error::Cache(_) => false,
        }
    }

    /// Returns `true` if this error reports a canceled call.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled(_))
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http(failure) => Some(failure.status),
            Error::Parse(failure) => failure.status,
            _ => None,
        }
    }

    /// Returns the raw response body if this error still carries one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Http(failure) => failure.raw_response().map(|raw| raw.body.as_str()),
            Error::Parse(failure) => Some(&failure.raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for operation calls.
pub type Result<T> = std::result::Result<T, Error>;
