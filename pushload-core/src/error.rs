//! Error types for the protocol engine

use pushload_interfaces::TransportError;
use thiserror::Error;

/// The server said something the client cannot work with
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Server returned status {0}")]
    Status(String),

    #[error("Missing field '{field}' in {message_type} response")]
    MissingField {
        field: &'static str,
        message_type: String,
    },

    #[error("Unexpected message: {0}")]
    Unexpected(String),
}

/// Anything that ends a virtual client before its behavior finished
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Invalid behavior mix
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BehaviorError {
    #[error("Unknown behavior: {0}")]
    UnknownBehavior(String),

    #[error("Behavior table is empty")]
    EmptyTable,

    #[error("Behavior weights sum to zero")]
    ZeroWeight,
}

/// Result alias used throughout the engine
pub type ClientResult<T> = Result<T, ClientError>;
