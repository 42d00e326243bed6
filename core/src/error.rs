//! Error types for the router CGI client.
//!
//! # Design
//! Encoding problems (`MalformedCommand`) are raised before any request is
//! built, so a bad command never reaches the wire. Everything the router
//! reports through its trailing status line lands in `ApplicationError` with
//! the numeric code untouched; interpreting module-specific codes is left to
//! the caller.

use thiserror::Error;

/// Errors returned by the codec, the session and the transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller built a command the wire format cannot carry.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Network failure, timeout, or a non-2xx HTTP status. For HTTP failures
    /// the raw body is kept for diagnostics.
    #[error("transport error: {message}")]
    TransportError {
        message: String,
        body: Option<String>,
    },

    /// The response is missing the status marker or a section is truncated.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Well-formed response carrying a non-zero router status code.
    #[error("router returned error {code}")]
    ApplicationError { code: i64 },

    /// No newly assigned instance index in the response.
    #[error("no assigned id in response")]
    IdNotFound,

    /// Connection settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;
