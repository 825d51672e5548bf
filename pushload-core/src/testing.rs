//! In-memory stand-ins for the network, used by tests
//!
//! [`ScriptedTransport`] and [`RecordingTrigger`] record what a client sends
//! and let a test feed replies by hand. [`FakePushServer`] answers the
//! protocol on its own so that whole sessions and runs can execute without a
//! socket.

use async_trait::async_trait;
use pushload_interfaces::{Connector, PushTrigger, Transport, TransportError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn parse_sent(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or(Value::Null)
}

/// Transport that records sent frames and replays queued inbound ones
pub struct ScriptedTransport {
    sent: Arc<Mutex<Vec<Value>>>,
    inbound: mpsc::UnboundedReceiver<String>,
    closed: Arc<Mutex<bool>>,
    stall_close: Arc<AtomicBool>,
}

/// Test-side view of a [`ScriptedTransport`]
#[derive(Clone)]
pub struct TransportHandle {
    sent: Arc<Mutex<Vec<Value>>>,
    inbound: mpsc::UnboundedSender<String>,
    closed: Arc<Mutex<bool>>,
    stall_close: Arc<AtomicBool>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, TransportHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        let stall_close = Arc::new(AtomicBool::new(false));
        (
            Self {
                sent: sent.clone(),
                inbound: rx,
                closed: closed.clone(),
                stall_close: stall_close.clone(),
            },
            TransportHandle {
                sent,
                inbound: tx,
                closed,
                stall_close,
            },
        )
    }
}

impl TransportHandle {
    /// Every frame the client sent, parsed as JSON
    pub fn sent(&self) -> Vec<Value> {
        lock(&self.sent).clone()
    }

    /// Queue a frame for the client to receive
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.inbound.send(text.into());
    }

    /// Whether the client has started closing the transport
    pub fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }

    /// Make every later `close()` hang, like a peer that stopped reading
    pub fn stall_close(&self) {
        self.stall_close.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        lock(&self.sent).push(parse_sent(&text));
        Ok(())
    }

    async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        *lock(&self.closed) = true;
        if self.stall_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Trigger that records every PUT and optionally fails them
#[derive(Clone, Default)]
pub struct RecordingTrigger {
    puts: Arc<Mutex<Vec<(String, u64)>>>,
    fail_status: Option<u16>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A trigger whose PUTs all come back with `status`
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    pub fn puts(&self) -> Vec<(String, u64)> {
        lock(&self.puts).clone()
    }
}

#[async_trait]
impl PushTrigger for RecordingTrigger {
    async fn put(&self, endpoint: &str, version: u64) -> Result<(), TransportError> {
        lock(&self.puts).push((endpoint.to_string(), version));
        match self.fail_status {
            Some(status) => Err(TransportError::PutStatus {
                endpoint: endpoint.to_string(),
                status,
            }),
            None => Ok(()),
        }
    }
}

/// Knobs for [`FakePushServer`]
#[derive(Debug, Clone)]
pub struct FakeServerOptions {
    /// Status returned in register responses
    pub register_status: u16,
    /// Delay between a PUT and the notification it causes
    pub notification_delay: Duration,
    /// Never answer anything
    pub silent: bool,
    /// Refuse new connections
    pub refuse_connections: bool,
}

impl Default for FakeServerOptions {
    fn default() -> Self {
        Self {
            register_status: 200,
            notification_delay: Duration::ZERO,
            silent: false,
            refuse_connections: false,
        }
    }
}

#[derive(Default)]
struct ServerState {
    next_conn: u64,
    connections: HashMap<u64, mpsc::UnboundedSender<String>>,
    /// endpoint -> (connection, channelID)
    endpoints: HashMap<String, (u64, String)>,
    received: Vec<(u64, Value)>,
    puts: Vec<(String, u64)>,
    closed: Vec<u64>,
}

/// A push server living in memory.
///
/// Cloning shares the same server. Use [`connector`](Self::connector) and
/// [`trigger`](Self::trigger) to hand it to the code under test.
#[derive(Clone)]
pub struct FakePushServer {
    options: Arc<FakeServerOptions>,
    state: Arc<Mutex<ServerState>>,
}

impl FakePushServer {
    pub fn new() -> Self {
        Self::with_options(FakeServerOptions::default())
    }

    pub fn with_options(options: FakeServerOptions) -> Self {
        Self {
            options: Arc::new(options),
            state: Arc::new(Mutex::new(ServerState::default())),
        }
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            server: self.clone(),
        }
    }

    pub fn trigger(&self) -> FakeTrigger {
        FakeTrigger {
            server: self.clone(),
        }
    }

    /// Connections opened so far
    pub fn connection_count(&self) -> u64 {
        lock(&self.state).next_conn
    }

    /// Connections the client side closed
    pub fn closed_count(&self) -> usize {
        lock(&self.state).closed.len()
    }

    /// Every frame received on connection `conn`
    pub fn received_on(&self, conn: u64) -> Vec<Value> {
        lock(&self.state)
            .received
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Every frame received, with its connection number
    pub fn received(&self) -> Vec<(u64, Value)> {
        lock(&self.state).received.clone()
    }

    /// Every PUT accepted, in order
    pub fn puts(&self) -> Vec<(String, u64)> {
        lock(&self.state).puts.clone()
    }

    fn open(&self) -> Result<FakeTransport, TransportError> {
        if self.options.refuse_connections {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);
        let conn = state.next_conn;
        state.next_conn += 1;
        state.connections.insert(conn, tx);
        Ok(FakeTransport {
            conn,
            server: self.clone(),
            inbound: rx,
        })
    }

    fn close(&self, conn: u64) {
        let mut state = lock(&self.state);
        state.connections.remove(&conn);
        state.closed.push(conn);
    }

    fn handle(&self, conn: u64, text: &str) {
        let message = parse_sent(text);
        let mut state = lock(&self.state);
        state.received.push((conn, message.clone()));
        if self.options.silent {
            return;
        }

        let reply = match message.get("messageType").and_then(Value::as_str) {
            Some("hello") => {
                let uaid = message
                    .get("uaid")
                    .and_then(Value::as_str)
                    .unwrap_or("assigned-uaid");
                Some(json!({"messageType": "hello", "status": 200, "uaid": uaid}))
            }
            Some("register") => match message.get("channelID").and_then(Value::as_str) {
                Some(channel) => {
                    let endpoint = format!("http://fake.push/{}/{}", conn, channel);
                    state
                        .endpoints
                        .insert(endpoint.clone(), (conn, channel.to_string()));
                    Some(json!({
                        "messageType": "register",
                        "status": self.options.register_status,
                        "channelID": channel,
                        "pushEndpoint": endpoint,
                    }))
                }
                None => Some(json!({"messageType": "register", "status": 401})),
            },
            Some("unregister") => Some(json!({
                "messageType": "unregister",
                "status": 200,
                "channelID": message.get("channelID").cloned().unwrap_or(Value::Null),
            })),
            Some("ack") => None,
            Some(_) => Some(json!({"status": 401, "error": "Unknown message type"})),
            None if message.as_object().is_some_and(|m| m.is_empty()) => {
                Some(json!({"messageType": "ping"}))
            }
            None => Some(json!({"status": 401, "error": "Missing messageType"})),
        };

        if let (Some(reply), Some(tx)) = (reply, state.connections.get(&conn)) {
            let _ = tx.send(reply.to_string());
        }
    }

    fn put(&self, endpoint: &str, version: u64) -> Result<(), TransportError> {
        let (tx, notification) = {
            let mut state = lock(&self.state);
            let Some((conn, channel)) = state.endpoints.get(endpoint).cloned() else {
                return Err(TransportError::PutStatus {
                    endpoint: endpoint.to_string(),
                    status: 404,
                });
            };
            state.puts.push((endpoint.to_string(), version));
            if self.options.silent {
                return Ok(());
            }
            let notification = json!({
                "messageType": "notification",
                "updates": [{"channelID": channel, "version": version}],
            })
            .to_string();
            (state.connections.get(&conn).cloned(), notification)
        };

        let Some(tx) = tx else {
            return Ok(());
        };
        let delay = self.options.notification_delay;
        if delay.is_zero() {
            let _ = tx.send(notification);
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(notification);
            });
        }
        Ok(())
    }
}

impl Default for FakePushServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Client end of one fake connection
pub struct FakeTransport {
    conn: u64,
    server: FakePushServer,
    inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.server.handle(self.conn, &text);
        Ok(())
    }

    async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.server.close(self.conn);
        Ok(())
    }
}

/// Opens connections to a [`FakePushServer`]
#[derive(Clone)]
pub struct FakeConnector {
    server: FakePushServer,
}

#[async_trait]
impl Connector for FakeConnector {
    type Conn = FakeTransport;

    async fn connect(&self, _url: &str) -> Result<FakeTransport, TransportError> {
        self.server.open()
    }
}

/// PUT trigger aimed at a [`FakePushServer`]
#[derive(Clone)]
pub struct FakeTrigger {
    server: FakePushServer,
}

#[async_trait]
impl PushTrigger for FakeTrigger {
    async fn put(&self, endpoint: &str, version: u64) -> Result<(), TransportError> {
        self.server.put(endpoint, version)
    }
}
