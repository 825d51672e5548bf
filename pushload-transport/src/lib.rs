//! Network transports for pushload
//!
//! [`WsConnector`] opens real WebSocket connections with tokio-tungstenite
//! and [`HttpPushTrigger`] issues the `PUT <pushEndpoint>` trigger with
//! reqwest. Both implement the traits from `pushload-interfaces`, so the
//! protocol engine never sees either library.

pub mod http;
pub mod ws;

// Re-export main types for convenience
pub use http::HttpPushTrigger;
pub use ws::{WsConnector, WsTransport};
