//! Transport error types

use thiserror::Error;

/// Failures reported by a transport implementation.
///
/// Every variant aborts only the virtual client that observed it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Connection closed by peer")]
    Closed,

    #[error("PUT to {endpoint} failed: {reason}")]
    Put { endpoint: String, reason: String },

    #[error("PUT to {endpoint} returned status {status}")]
    PutStatus { endpoint: String, status: u16 },

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl TransportError {
    /// Whether this error came from the HTTP trigger rather than the socket
    pub fn is_put_failure(&self) -> bool {
        matches!(self, TransportError::Put { .. } | TransportError::PutStatus { .. })
    }
}
