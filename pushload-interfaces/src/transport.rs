//! Transport interface definitions
//!
//! These traits are the whole surface the protocol engine needs from the
//! network: text frames over one WebSocket, a way to open such a socket, and
//! the HTTP PUT trigger.

use async_trait::async_trait;

use crate::error::TransportError;

/// One open WebSocket connection carrying JSON text frames.
///
/// A transport is owned by exactly one virtual client task and is never
/// shared, so the methods take `&mut self`.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection. Control
    /// frames (ping/pong/binary) are handled inside the implementation and
    /// never surface here.
    async fn recv_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection from the client side
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens new connections to the target server
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connection type produced by this connector
    type Conn: Transport + 'static;

    /// Open a WebSocket connection to `url`
    async fn connect(&self, url: &str) -> Result<Self::Conn, TransportError>;
}

/// Issues the HTTP trigger that makes the server push a notification
#[async_trait]
pub trait PushTrigger: Send + Sync {
    /// `PUT <endpoint>` with a `version=<version>` form body.
    ///
    /// Any 2xx status is success; everything else is a [`TransportError`].
    async fn put(&self, endpoint: &str, version: u64) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: PushTrigger + ?Sized> PushTrigger for std::sync::Arc<T> {
    async fn put(&self, endpoint: &str, version: u64) -> Result<(), TransportError> {
        (**self).put(endpoint, version).await
    }
}
