//! Error types for parley.
//!
//! Grammar violations are the only failures callers are expected to match
//! on; transport and crypto failures are translated to boolean outcomes at
//! the delivery boundary and must never take down the server loop.

use thiserror::Error;

/// Core error type for parley operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Text does not conform to the wire grammar (header or content).
    #[error("format error: {0}")]
    Format(String),

    /// A key is malformed, mismatched, or unusable for the algorithm.
    #[error("invalid key material")]
    InvalidKey(String),

    /// Cryptographic operation failed.
    /// Details are intentionally vague to prevent oracle attacks.
    #[error("cryptographic operation failed")]
    Crypto(String),

    /// Connection refused, reset, or otherwise failed.
    #[error("transport error")]
    Transport(String),

    /// Operation exceeded the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// Storage operation failed.
    #[error("storage error")]
    Storage(String),

    /// Configuration value or file is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type alias using parley's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
