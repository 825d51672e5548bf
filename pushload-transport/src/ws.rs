//! WebSocket transport

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pushload_config::TargetConfig;
use pushload_interfaces::{Connector, Transport, TransportError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

/// Opens WebSocket connections to the push server
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnector {
    /// Create a new connector with the default handshake timeout
    pub fn new() -> Self {
        Self::from_config(&TargetConfig::default())
    }

    /// Create a new connector from the target configuration
    pub fn from_config(config: &TargetConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Conn = WsTransport;

    async fn connect(&self, url: &str) -> Result<WsTransport, TransportError> {
        let (stream, response) = timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(format!("connecting to {}", url)))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(url, status = %response.status(), "WebSocket connected");
        Ok(WsTransport { stream })
    }
}

/// One open WebSocket connection
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None
                }
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };

            match message {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!(len = data.len(), "Dropping non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    debug!(?frame, "Server closed the connection");
                    return None;
                }
                // Pings are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Skipping control frame");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Accept one connection and echo its text frames until it closes
    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            ws.send(Message::Ping(vec![1].into())).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if message.is_text() {
                    ws.send(message).await.unwrap();
                }
            }
        });
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_text_round_trip() {
        let url = echo_server().await;
        let mut transport = WsConnector::new().connect(&url).await.unwrap();

        transport
            .send_text(r#"{"messageType":"hello"}"#.to_string())
            .await
            .unwrap();
        let echoed = transport.recv_text().await.unwrap().unwrap();
        assert_eq!(echoed, r#"{"messageType":"hello"}"#);

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsConnector::new()
            .with_connect_timeout(Duration::from_secs(5))
            .connect(&format!("ws://{}", addr))
            .await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
