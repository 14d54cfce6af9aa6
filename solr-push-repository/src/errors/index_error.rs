//! Index backend error types.
//!
//! Every variant is fatal for the operation that produced it. Document-level
//! failures are not errors; they are reported as a `FlushOutcome`.

use thiserror::Error;

/// Errors that can occur while talking to the index backend.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Transport failure that was not retryable, or exhausted the retry budget.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request could not be built (bad URL, bad configuration).
    #[error("Request error: {0}")]
    Request(String),

    /// The backend answered with an HTTP status we cannot recover from.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response did not look like anything the backend is expected to send.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend rejected a commit.
    #[error("Commit error: {0}")]
    Commit(String),
}

impl IndexError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a request error.
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    /// Create an HTTP status error.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a commit error.
    pub fn commit(msg: impl Into<String>) -> Self {
        Self::Commit(msg.into())
    }
}
