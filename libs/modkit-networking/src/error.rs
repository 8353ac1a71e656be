use crate::request::Headers;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Boxed error type used for preserved causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Marker carried inside the rustls handshake error when the pinning gate
/// cancels the authentication challenge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("server certificate rejected by pinning policy for host '{host}'")]
pub struct PinningRejected {
    pub host: String,
}

/// Details of a completed exchange whose status was outside `200..=299`.
///
/// Carries the full body and headers so callers can branch on 401/403/404
/// and inspect server-provided diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatusError {
    /// Numeric HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: Bytes,
    /// Response headers
    pub headers: Headers,
}

impl HttpStatusError {
    /// Status in `400..=499`
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..=499).contains(&self.status)
    }

    /// Status in `500..=599`
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Networking client error types
///
/// Exactly one value is produced per failed exchange. Transport failures are
/// classified once, where the transport call returns; errors raised by
/// interceptors reach the caller unchanged.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NetworkError {
    /// Target address is malformed or uses an unsupported scheme
    #[error("Invalid request target '{url}': {reason}")]
    InvalidRequestTarget {
        /// The address that was rejected
        url: String,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Request could not be put on the wire (invalid header name or value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response payload did not parse as the requested type
    #[error("Failed to decode response: {0}")]
    DecodingFailed(#[source] serde_json::Error),

    /// Request payload could not be serialized
    #[error("Failed to encode request: {0}")]
    EncodingFailed(#[source] serde_json::Error),

    /// Transport completed with a non-2xx status
    #[error("HTTP error with status code: {}", .0.status)]
    HttpStatus(HttpStatusError),

    /// Transport-level failure that is neither a timeout nor a cancellation
    #[error("Connection error: {0}")]
    Connection(#[source] BoxError),

    /// Request exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Caller or system cancelled the exchange
    #[error("Request was cancelled")]
    Cancelled,

    /// TLS handshake rejected because the presented chain did not match the pins
    #[error("Certificate pinning validation failed for host '{host}'")]
    CertificatePinningFailed {
        /// Host whose pins rejected the handshake
        host: String,
    },

    /// Failure raised by an interceptor or token provider
    ///
    /// Downcast the source to recover the interceptor's own error type.
    #[error("Interceptor failed: {0}")]
    Interceptor(#[source] BoxError),

    /// TLS configuration could not be built (e.g. no usable root certificates)
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Catch-all that preserves the original cause
    #[error("Unknown error: {0}")]
    Unknown(#[source] BoxError),
}

impl NetworkError {
    /// Wrap a domain-specific interceptor failure.
    #[must_use]
    pub fn interceptor(err: impl Into<BoxError>) -> Self {
        NetworkError::Interceptor(err.into())
    }

    /// Returns the HTTP status details when this is an `HttpStatus` error.
    #[must_use]
    pub fn http_status(&self) -> Option<&HttpStatusError> {
        match self {
            NetworkError::HttpStatus(status) => Some(status),
            _ => None,
        }
    }
}
