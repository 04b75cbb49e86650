//! Error type shared by every backend transport implementation.

use thiserror::Error;

/// Errors raised while talking to a storage backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when the request never produced an HTTP response.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Target URL of the failed request.
        url: String,
        /// Message reported by the HTTP client.
        message: String,
    },
    /// Raised when the backend reports that the resource does not exist.
    #[error("resource not found at {url}")]
    NotFound {
        /// URL that returned `404 Not Found`.
        url: String,
    },
    /// Raised for any other non-success status code.
    #[error("{url} returned HTTP {status}: {body}")]
    Http {
        /// URL that returned the failure.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// URL whose response could not be decoded.
        url: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when Keystone rejects the credentials or omits the token.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Raised when the service catalog lacks a usable endpoint.
    #[error("no {service} endpoint for region {region} on the {interface} interface")]
    MissingEndpoint {
        /// Service type that was requested.
        service: String,
        /// Region that was requested.
        region: String,
        /// Endpoint interface (`public`, `internal`, or `admin`).
        interface: String,
    },
}

impl ApiError {
    /// Returns `true` when the backend reported the resource as absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
