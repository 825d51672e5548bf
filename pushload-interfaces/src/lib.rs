//! # Pushload Interfaces
//!
//! Transport interfaces for the pushload protocol engine.
//!
//! The engine in `pushload-core` never talks to a socket or an HTTP client
//! directly. It drives a [`Transport`] for the WebSocket side of a connection,
//! a [`PushTrigger`] for the HTTP PUT that asks the server to emit a
//! notification, and a [`Connector`] to open new connections. Real
//! implementations live in `pushload-transport`; tests use the in-memory fake
//! server from `pushload-core`.
//!
//! ## Main Interfaces
//!
//! - [`Transport`] - Text frame send/receive on one open connection
//! - [`Connector`] - Opens a [`Transport`] to a target URL
//! - [`PushTrigger`] - Issues the `PUT <pushEndpoint>` trigger

pub mod error;
pub mod transport;

// Re-export commonly used types
pub use error::TransportError;
pub use transport::{Connector, PushTrigger, Transport};
