//! Protocol client state machine
//!
//! One [`ProtocolClient`] drives one virtual client. Every inbound frame goes
//! through [`ProtocolClient::on_message`], which applies the status, deadline
//! and ceiling checks in a fixed order before dispatching on the frame's
//! `messageType` and the client's [`Behavior`].

use pushload_config::ClientConfig;
use pushload_interfaces::{PushTrigger, Transport, TransportError};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::behavior::Behavior;
use crate::error::{ClientError, ClientResult, ProtocolError};
use crate::fuzz::fuzz_burst;
use crate::message::{ClientMessage, MessageType, ServerMessage};
use crate::metrics::{outcome_for_error, CloseReason, MetricsRecorder, RunResult};
use crate::watchdog::TimeoutWatchdog;

/// Where a virtual client is in its script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Opened,
    HelloSent,
    Registered,
    AwaitingNotification,
    Acked,
    Closed,
    Fuzzing,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity and progress of one simulated subscriber
#[derive(Debug, Clone)]
pub struct VirtualClient {
    pub uaid: String,
    /// Current channel; only a rotation changes it
    pub channel_id: String,
    pub version: u64,
    /// Push endpoint of the current channel, once registered
    pub endpoint: Option<String>,
    pub behavior: Behavior,
    pub state: ClientState,
    /// Inbound messages dispatched so far
    pub processed: u32,
    /// Channel rotations performed so far
    pub rotations: u32,
}

/// What the session should do after a message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close(CloseReason),
}

/// Generate a fresh uaid or channel id
pub fn new_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    uuid::Builder::from_random_bytes(rng.random())
        .into_uuid()
        .to_string()
}

/// Generate a fresh 8-digit notification version
pub fn new_version<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    rng.random_range(10_000_000..=99_999_999)
}

/// Uniform delay in `[0, max)`
fn draw_delay<R: Rng + ?Sized>(rng: &mut R, max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..max_ms))
}

/// Drives one virtual client over a transport
pub struct ProtocolClient<T, P> {
    client: VirtualClient,
    config: Arc<ClientConfig>,
    transport: T,
    trigger: P,
    rng: StdRng,
    think_time: Duration,
    /// Rotated channels waiting for their hello/register cycle
    pending_channels: VecDeque<String>,
    metrics: MetricsRecorder,
}

impl<T, P> ProtocolClient<T, P>
where
    T: Transport,
    P: PushTrigger,
{
    /// Create a client for a freshly opened connection.
    ///
    /// Identity, initial version and think time are all drawn from `rng`, so
    /// a seeded rng reproduces the whole conversation.
    pub fn new(
        transport: T,
        trigger: P,
        behavior: Behavior,
        config: Arc<ClientConfig>,
        mut rng: StdRng,
    ) -> Self {
        let uaid = match config.shared_uaid {
            Some(ref shared) if behavior.registers() => shared.clone(),
            _ => new_id(&mut rng),
        };
        let channel_id = new_id(&mut rng);
        let version = new_version(&mut rng);
        let think_time = draw_delay(&mut rng, config.max_sleep);

        Self {
            client: VirtualClient {
                uaid,
                channel_id,
                version,
                endpoint: None,
                behavior,
                state: ClientState::Opened,
                processed: 0,
                rotations: 0,
            },
            config,
            transport,
            trigger,
            rng,
            think_time,
            pending_channels: VecDeque::new(),
            metrics: MetricsRecorder::new(Instant::now()),
        }
    }

    pub fn virtual_client(&self) -> &VirtualClient {
        &self.client
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn think_time(&self) -> Duration {
        self.think_time
    }

    /// Send the opening frames: a hello, or the first fuzz burst
    pub async fn open(&mut self) -> ClientResult<()> {
        if self.client.behavior == Behavior::Fuzz {
            self.set_state(ClientState::Fuzzing);
            return self.send_fuzz_burst().await;
        }
        self.send_hello().await
    }

    /// Wait for the next inbound text frame
    pub async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.transport.recv_text().await
    }

    /// Close the transport from our side
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.set_state(ClientState::Closed);
        self.transport.close().await
    }

    /// Handle one inbound frame.
    ///
    /// Checks run in this order: parse, status, deadlines, idle reset,
    /// message ceiling, think time, dispatch. A fuzz client skips the parse
    /// failure, status and ceiling checks.
    pub async fn on_message(
        &mut self,
        text: &str,
        watchdog: &TimeoutWatchdog,
    ) -> ClientResult<Flow> {
        let received_at = Instant::now();
        self.metrics.record_received();

        if self.client.state == ClientState::Fuzzing {
            return self.on_fuzz_message(text, watchdog, received_at).await;
        }

        let message = ServerMessage::parse(text)?;
        trace!(
            uaid = %self.client.uaid,
            message_type = message.type_name(),
            "Received message"
        );

        message.check_status()?;

        if let Some(kind) = watchdog.check(received_at) {
            return Ok(Flow::Close(CloseReason::TimedOut(kind)));
        }
        watchdog.touch(received_at);

        if self.client.processed > self.config.max_updates {
            debug!(
                uaid = %self.client.uaid,
                processed = self.client.processed,
                "Message ceiling reached"
            );
            return Ok(Flow::Close(CloseReason::MaxUpdates));
        }

        if message.message_type.is_some() && !self.think_time.is_zero() {
            tokio::time::sleep(self.think_time).await;
        }

        let flow = self.dispatch(&message, received_at).await?;
        self.client.processed += 1;
        Ok(flow)
    }

    /// Turn the session's final state into a [`RunResult`]
    pub fn finish(&mut self, result: ClientResult<CloseReason>) -> RunResult {
        self.set_state(ClientState::Closed);
        let (outcome, detail) = match result {
            Ok(reason) => (reason.outcome(), reason.to_string()),
            Err(ref error) => (outcome_for_error(error), error.to_string()),
        };
        self.metrics.finish(
            outcome,
            self.client.behavior,
            self.client.uaid.clone(),
            self.client.processed,
            detail,
            Instant::now(),
        )
    }

    async fn dispatch(
        &mut self,
        message: &ServerMessage,
        received_at: Instant,
    ) -> ClientResult<Flow> {
        if self.client.behavior == Behavior::HandshakeOnly {
            return Ok(Flow::Close(CloseReason::BehaviorComplete));
        }

        let Some(message_type) = message.message_type.as_ref() else {
            return Ok(Flow::Continue);
        };

        // An acked ping_loop client answers everything with a ping
        if self.client.state == ClientState::Acked {
            self.send(ClientMessage::Ping).await?;
            return Ok(Flow::Continue);
        }

        match message_type {
            MessageType::Hello => self.on_hello().await,
            MessageType::Register => self.on_register(message, received_at).await,
            MessageType::Ping => {
                self.send(ClientMessage::Ping).await?;
                Ok(Flow::Continue)
            }
            MessageType::Notification => self.on_notification(message, received_at).await,
            MessageType::Unregister | MessageType::Ack | MessageType::Other(_) => {
                debug!(
                    uaid = %self.client.uaid,
                    message_type = message_type.as_str(),
                    "Ignoring message"
                );
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_hello(&mut self) -> ClientResult<Flow> {
        if !self.client.behavior.registers() {
            self.send(ClientMessage::Ping).await?;
            return Ok(Flow::Continue);
        }

        let channel_id = self
            .pending_channels
            .pop_front()
            .unwrap_or_else(|| self.client.channel_id.clone());
        self.send(ClientMessage::Register {
            channel_id,
            uaid: self.client.uaid.clone(),
        })
        .await?;
        self.set_state(ClientState::Registered);
        Ok(Flow::Continue)
    }

    async fn on_register(
        &mut self,
        message: &ServerMessage,
        received_at: Instant,
    ) -> ClientResult<Flow> {
        if !self.client.behavior.registers() {
            return Ok(Flow::Continue);
        }

        let endpoint = message.push_endpoint()?.to_string();
        self.metrics.record_registered(received_at);

        let for_current = message
            .channel_id()
            .is_none_or(|channel| channel == self.client.channel_id);
        if for_current && self.client.endpoint.is_none() {
            self.client.endpoint = Some(endpoint.clone());
        }

        self.set_state(ClientState::AwaitingNotification);
        self.trigger_put(&endpoint).await?;
        Ok(Flow::Continue)
    }

    async fn on_notification(
        &mut self,
        message: &ServerMessage,
        received_at: Instant,
    ) -> ClientResult<Flow> {
        self.metrics.record_notified(received_at);

        match self.client.behavior {
            Behavior::ConnClose => {
                self.send_ack(message).await?;
                self.send_unregister(message).await?;
                Ok(Flow::Close(CloseReason::BehaviorComplete))
            }
            Behavior::ConnNoack => {
                self.send_unregister(message).await?;
                Ok(Flow::Close(CloseReason::BehaviorComplete))
            }
            Behavior::OneChan => {
                self.send_ack(message).await?;
                self.client.version += 1;
                let endpoint = self.client.endpoint.clone().ok_or_else(|| {
                    ProtocolError::Unexpected("notification before registration".to_string())
                })?;
                self.trigger_put(&endpoint).await?;
                Ok(Flow::Continue)
            }
            Behavior::NewChan => {
                self.send_ack(message).await?;
                self.send_unregister(message).await?;
                self.rotate_channel();
                self.send_hello().await?;
                Ok(Flow::Continue)
            }
            Behavior::MultiChan => {
                self.send_ack(message).await?;
                self.send_unregister(message).await?;
                for _ in 0..2 {
                    self.rotate_channel();
                    self.send_hello().await?;
                }
                Ok(Flow::Continue)
            }
            Behavior::PingLoop => {
                self.send_ack(message).await?;
                self.set_state(ClientState::Acked);
                self.send(ClientMessage::Ping).await?;
                Ok(Flow::Continue)
            }
            Behavior::PingOnly | Behavior::HandshakeOnly | Behavior::Fuzz => {
                debug!(uaid = %self.client.uaid, "Unsolicited notification");
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_fuzz_message(
        &mut self,
        text: &str,
        watchdog: &TimeoutWatchdog,
        received_at: Instant,
    ) -> ClientResult<Flow> {
        if let Some(kind) = watchdog.check(received_at) {
            return Ok(Flow::Close(CloseReason::TimedOut(kind)));
        }
        watchdog.touch(received_at);

        match ServerMessage::parse(text) {
            Ok(message) => trace!(
                uaid = %self.client.uaid,
                message_type = message.type_name(),
                status = ?message.get("status"),
                "Fuzz target replied"
            ),
            Err(error) => trace!(uaid = %self.client.uaid, %error, "Fuzz target sent malformed reply"),
        }

        // At least 1ms so a zero max_sleep cannot starve the timers
        let delay = draw_delay(&mut self.rng, self.config.max_sleep).max(Duration::from_millis(1));
        tokio::time::sleep(delay).await;

        self.send_fuzz_burst().await?;
        self.client.processed += 1;
        Ok(Flow::Continue)
    }

    async fn send(&mut self, message: ClientMessage) -> ClientResult<()> {
        trace!(uaid = %self.client.uaid, kind = message.kind(), "Sending message");
        self.transport.send_text(message.to_string()).await?;
        self.metrics.record_sent();
        Ok(())
    }

    async fn send_hello(&mut self) -> ClientResult<()> {
        self.send(ClientMessage::Hello {
            uaid: self.client.uaid.clone(),
        })
        .await?;
        self.set_state(ClientState::HelloSent);
        Ok(())
    }

    /// Ack what the notification carried, or the current channel if it carried nothing usable
    async fn send_ack(&mut self, message: &ServerMessage) -> ClientResult<()> {
        let updates = message.updates();
        let ack = if updates.is_empty() {
            ClientMessage::ack(self.client.channel_id.clone(), self.client.version)
        } else {
            ClientMessage::Ack { updates }
        };
        self.send(ack).await
    }

    /// Unregister the channel the notification was for, or the current one
    async fn send_unregister(&mut self, message: &ServerMessage) -> ClientResult<()> {
        let channel_id = message
            .updates()
            .into_iter()
            .next()
            .map(|update| update.channel_id)
            .unwrap_or_else(|| self.client.channel_id.clone());
        self.send(ClientMessage::Unregister { channel_id }).await
    }

    async fn send_fuzz_burst(&mut self) -> ClientResult<()> {
        let burst = fuzz_burst(
            &self.client.uaid,
            &self.client.channel_id,
            self.client.version,
        );
        for message in burst {
            self.send(message).await?;
        }
        Ok(())
    }

    async fn trigger_put(&mut self, endpoint: &str) -> ClientResult<()> {
        self.metrics.record_put_sent(Instant::now());
        self.trigger
            .put(endpoint, self.client.version)
            .await
            .map_err(ClientError::from)
    }

    fn rotate_channel(&mut self) {
        self.client.channel_id = new_id(&mut self.rng);
        self.client.version = new_version(&mut self.rng);
        self.client.endpoint = None;
        self.client.rotations += 1;
        self.pending_channels
            .push_back(self.client.channel_id.clone());
    }

    fn set_state(&mut self, state: ClientState) {
        if self.client.state != state {
            trace!(
                uaid = %self.client.uaid,
                from = %self.client.state,
                to = %state,
                "State change"
            );
            self.client.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingTrigger, ScriptedTransport, TransportHandle};
    use crate::watchdog::TimeoutKind;
    use rand::SeedableRng;
    use serde_json::{json, Value};

    type TestClient = ProtocolClient<ScriptedTransport, RecordingTrigger>;

    fn test_config() -> ClientConfig {
        ClientConfig {
            max_sleep: Duration::ZERO,
            max_updates: 100,
            timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(30),
            shared_uaid: None,
        }
    }

    fn client_with(
        behavior: Behavior,
        config: ClientConfig,
    ) -> (TestClient, TransportHandle, RecordingTrigger) {
        let (transport, handle) = ScriptedTransport::new();
        let trigger = RecordingTrigger::new();
        let client = ProtocolClient::new(
            transport,
            trigger.clone(),
            behavior,
            Arc::new(config),
            StdRng::seed_from_u64(11),
        );
        (client, handle, trigger)
    }

    fn watchdog() -> TimeoutWatchdog {
        TimeoutWatchdog::start(Duration::from_secs(60), Duration::from_secs(30))
    }

    fn hello_reply(uaid: &str) -> String {
        json!({"messageType": "hello", "status": 200, "uaid": uaid}).to_string()
    }

    fn register_reply(channel_id: &str) -> String {
        json!({
            "messageType": "register",
            "status": 200,
            "channelID": channel_id,
            "pushEndpoint": format!("http://fake/push/{}", channel_id),
        })
        .to_string()
    }

    fn notification(channel_id: &str, version: u64) -> String {
        json!({
            "messageType": "notification",
            "updates": [{"channelID": channel_id, "version": version}],
        })
        .to_string()
    }

    fn types(sent: &[Value]) -> Vec<String> {
        sent.iter()
            .map(|m| m["messageType"].as_str().unwrap_or("ping").to_string())
            .collect()
    }

    /// Open and complete hello + register, leaving one PUT recorded
    async fn registered(client: &mut TestClient, watchdog: &TimeoutWatchdog) {
        client.open().await.unwrap();
        let uaid = client.virtual_client().uaid.clone();
        let channel = client.virtual_client().channel_id.clone();
        client.on_message(&hello_reply(&uaid), watchdog).await.unwrap();
        client
            .on_message(&register_reply(&channel), watchdog)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_sends_hello() {
        let (mut client, handle, _) = client_with(Behavior::ConnClose, test_config());
        client.open().await.unwrap();

        let sent = handle.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["messageType"], "hello");
        assert_eq!(sent[0]["uaid"], client.virtual_client().uaid.as_str());
        assert_eq!(sent[0]["channelIDs"], json!([]));
        assert_eq!(client.virtual_client().state, ClientState::HelloSent);
    }

    #[tokio::test]
    async fn test_identity_is_well_formed() {
        let (client, _, _) = client_with(Behavior::OneChan, test_config());
        let vc = client.virtual_client();
        assert!(uuid::Uuid::parse_str(&vc.uaid).is_ok());
        assert!(uuid::Uuid::parse_str(&vc.channel_id).is_ok());
        assert_ne!(vc.uaid, vc.channel_id);
        assert!((10_000_000..=99_999_999).contains(&vc.version));
    }

    #[tokio::test]
    async fn test_register_triggers_put() {
        let (mut client, handle, trigger) = client_with(Behavior::OneChan, test_config());
        let watchdog = watchdog();
        registered(&mut client, &watchdog).await;

        let vc = client.virtual_client();
        assert_eq!(types(&handle.sent()), vec!["hello", "register"]);
        assert_eq!(handle.sent()[1]["channelID"], vc.channel_id.as_str());
        assert_eq!(
            vc.endpoint.as_deref(),
            Some(format!("http://fake/push/{}", vc.channel_id).as_str())
        );
        assert_eq!(vc.state, ClientState::AwaitingNotification);
        assert_eq!(
            trigger.puts(),
            vec![(vc.endpoint.clone().unwrap(), vc.version)]
        );
    }

    #[tokio::test]
    async fn test_conn_close_acks_unregisters_and_closes() {
        let (mut client, handle, _) = client_with(Behavior::ConnClose, test_config());
        let watchdog = watchdog();
        registered(&mut client, &watchdog).await;

        let channel = client.virtual_client().channel_id.clone();
        let version = client.virtual_client().version;
        let flow = client
            .on_message(&notification(&channel, version), &watchdog)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Close(CloseReason::BehaviorComplete));
        let sent = handle.sent();
        assert_eq!(types(&sent), vec!["hello", "register", "ack", "unregister"]);
        assert_eq!(sent[2]["updates"][0]["version"], version);
        assert_eq!(sent[3]["channelID"], channel.as_str());
    }

    #[tokio::test]
    async fn test_conn_noack_skips_ack() {
        let (mut client, handle, _) = client_with(Behavior::ConnNoack, test_config());
        let watchdog = watchdog();
        registered(&mut client, &watchdog).await;

        let channel = client.virtual_client().channel_id.clone();
        let flow = client
            .on_message(&notification(&channel, 1), &watchdog)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Close(CloseReason::BehaviorComplete));
        assert_eq!(types(&handle.sent()), vec!["hello", "register", "unregister"]);
    }

    #[tokio::test]
    async fn test_one_chan_increments_version() {
        let (mut client, _, trigger) = client_with(Behavior::OneChan, test_config());
        let watchdog = watchdog();
        registered(&mut client, &watchdog).await;

        let channel = client.virtual_client().channel_id.clone();
        let endpoint = client.virtual_client().endpoint.clone().unwrap();
        let first_version = client.virtual_client().version;

        for cycle in 1..=3u64 {
            let version = client.virtual_client().version;
            let flow = client
                .on_message(&notification(&channel, version), &watchdog)
                .await
                .unwrap();
            assert_eq!(flow, Flow::Continue);
            assert_eq!(client.virtual_client().version, first_version + cycle);
            assert_eq!(client.virtual_client().channel_id, channel);
            assert_eq!(client.virtual_client().endpoint.as_deref(), Some(endpoint.as_str()));
        }

        let versions: Vec<u64> = trigger.puts().into_iter().map(|(_, v)| v).collect();
        assert_eq!(
            versions,
            vec![
                first_version,
                first_version + 1,
                first_version + 2,
                first_version + 3
            ]
        );
    }

    #[tokio::test]
    async fn test_new_chan_rotates_channel_and_keeps_uaid() {
        let (mut client, handle, _) = client_with(Behavior::NewChan, test_config());
        let watchdog = watchdog();
        registered(&mut client, &watchdog).await;
        let uaid = client.virtual_client().uaid.clone();

        for _ in 0..3 {
            let before = client.virtual_client().channel_id.clone();
            client
                .on_message(&notification(&before, 1), &watchdog)
                .await
                .unwrap();

            let vc = client.virtual_client();
            assert_ne!(vc.channel_id, before);
            assert_eq!(vc.uaid, uaid);
            assert!(vc.endpoint.is_none());
            assert_eq!(vc.state, ClientState::HelloSent);

            // Complete the new registration
            let channel = vc.channel_id.clone();
            client.on_message(&hello_reply(&uaid), &watchdog).await.unwrap();
            assert_eq!(handle.sent().last().unwrap()["channelID"], channel.as_str());
            client
                .on_message(&register_reply(&channel), &watchdog)
                .await
                .unwrap();
            assert!(client.virtual_client().endpoint.is_some());
        }
        assert_eq!(client.virtual_client().rotations, 3);
    }

    #[tokio::test]
    async fn test_multi_chan_rotates_twice_per_cycle() {
        let (mut client, handle, trigger) = client_with(Behavior::MultiChan, test_config());
        let watchdog = watchdog();
        registered(&mut client, &watchdog).await;
        let uaid = client.virtual_client().uaid.clone();

        let channel = client.virtual_client().channel_id.clone();
        client
            .on_message(&notification(&channel, 1), &watchdog)
            .await
            .unwrap();
        assert_eq!(client.virtual_client().rotations, 2);
        assert_eq!(
            types(&handle.sent()),
            vec!["hello", "register", "ack", "unregister", "hello", "hello"]
        );

        // Each hello reply registers the next rotated channel, oldest first
        client.on_message(&hello_reply(&uaid), &watchdog).await.unwrap();
        client.on_message(&hello_reply(&uaid), &watchdog).await.unwrap();
        let sent = handle.sent();
        let first = sent[6]["channelID"].as_str().unwrap().to_string();
        let second = sent[7]["channelID"].as_str().unwrap().to_string();
        assert_ne!(first, second);
        assert_ne!(first, channel);
        assert_eq!(second, client.virtual_client().channel_id);

        client.on_message(&register_reply(&first), &watchdog).await.unwrap();
        client.on_message(&register_reply(&second), &watchdog).await.unwrap();
        assert_eq!(trigger.puts().len(), 3);
        // No further rotation until the next notification
        assert_eq!(client.virtual_client().rotations, 2);
        assert_eq!(
            client.virtual_client().endpoint.as_deref(),
            Some(format!("http://fake/push/{}", second).as_str())
        );

        // Second cycle: the older rotated channel is notified first and is
        // the one that gets unregistered, not the newest
        client
            .on_message(&notification(&first, 2), &watchdog)
            .await
            .unwrap();
        let sent = handle.sent();
        assert_eq!(sent[8]["messageType"], "ack");
        assert_eq!(sent[8]["updates"][0]["channelID"], first.as_str());
        assert_eq!(sent[9]["messageType"], "unregister");
        assert_eq!(sent[9]["channelID"], first.as_str());
        assert_eq!(client.virtual_client().rotations, 4);
    }

    #[tokio::test]
    async fn test_ping_loop_pings_after_ack() {
        let (mut client, handle, _) = client_with(Behavior::PingLoop, test_config());
        let watchdog = watchdog();
        registered(&mut client, &watchdog).await;

        let channel = client.virtual_client().channel_id.clone();
        client
            .on_message(&notification(&channel, 1), &watchdog)
            .await
            .unwrap();
        assert_eq!(client.virtual_client().state, ClientState::Acked);

        client
            .on_message(r#"{"messageType":"ping"}"#, &watchdog)
            .await
            .unwrap();
        client
            .on_message(r#"{"messageType":"unregister","status":200}"#, &watchdog)
            .await
            .unwrap();

        assert_eq!(
            types(&handle.sent()),
            vec!["hello", "register", "ack", "ping", "ping", "ping"]
        );
        assert_eq!(handle.sent()[3], json!({}));
    }

    #[tokio::test]
    async fn test_ping_only_never_registers() {
        let (mut client, handle, trigger) = client_with(Behavior::PingOnly, test_config());
        let watchdog = watchdog();
        client.open().await.unwrap();
        let uaid = client.virtual_client().uaid.clone();

        client.on_message(&hello_reply(&uaid), &watchdog).await.unwrap();
        client
            .on_message(r#"{"messageType":"ping"}"#, &watchdog)
            .await
            .unwrap();

        assert_eq!(types(&handle.sent()), vec!["hello", "ping", "ping"]);
        assert!(trigger.puts().is_empty());
    }

    #[tokio::test]
    async fn test_handshake_only_closes_on_first_response() {
        let (mut client, handle, _) = client_with(Behavior::HandshakeOnly, test_config());
        let watchdog = watchdog();
        client.open().await.unwrap();

        let flow = client
            .on_message(r#"{"messageType":"hello","status":200}"#, &watchdog)
            .await
            .unwrap();
        assert_eq!(flow, Flow::Close(CloseReason::BehaviorComplete));
        assert_eq!(types(&handle.sent()), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_shared_uaid_applies_to_registering_variants() {
        let mut config = test_config();
        config.shared_uaid = Some("shared".to_string());

        let (client, _, _) = client_with(Behavior::OneChan, config.clone());
        assert_eq!(client.virtual_client().uaid, "shared");

        let (client, _, _) = client_with(Behavior::PingOnly, config);
        assert_ne!(client.virtual_client().uaid, "shared");
    }

    #[tokio::test]
    async fn test_error_status_closes_in_any_state() {
        let (mut client, _, _) = client_with(Behavior::OneChan, test_config());
        let watchdog = watchdog();
        registered(&mut client, &watchdog).await;

        let err = client
            .on_message(r#"{"messageType":"notification","status":503}"#, &watchdog)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::Protocol(ProtocolError::Status("503".to_string()))
        );

        let (mut fresh, _, _) = client_with(Behavior::ConnClose, test_config());
        fresh.open().await.unwrap();
        let err = fresh
            .on_message(r#"{"messageType":"hello","status":503}"#, &watchdog)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::Status(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_is_checked_before_deadlines() {
        let (mut client, _, _) = client_with(Behavior::OneChan, test_config());
        let watchdog = TimeoutWatchdog::start(Duration::from_secs(1), Duration::from_secs(1));
        client.open().await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        let err = client
            .on_message(r#"{"status":503}"#, &watchdog)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::Status(_))));

        let flow = client
            .on_message(r#"{"messageType":"ping"}"#, &watchdog)
            .await
            .unwrap();
        assert_eq!(flow, Flow::Close(CloseReason::TimedOut(TimeoutKind::Absolute)));
    }

    #[tokio::test]
    async fn test_message_ceiling() {
        let mut config = test_config();
        config.max_updates = 5;
        let (mut client, _, _) = client_with(Behavior::PingOnly, config);
        let watchdog = watchdog();
        client.open().await.unwrap();

        for _ in 0..6 {
            let flow = client
                .on_message(r#"{"messageType":"ping"}"#, &watchdog)
                .await
                .unwrap();
            assert_eq!(flow, Flow::Continue);
        }
        let flow = client
            .on_message(r#"{"messageType":"ping"}"#, &watchdog)
            .await
            .unwrap();
        assert_eq!(flow, Flow::Close(CloseReason::MaxUpdates));
        assert_eq!(client.virtual_client().processed, 6);
    }

    #[tokio::test]
    async fn test_status_wins_over_exhausted_ceiling() {
        let mut config = test_config();
        config.max_updates = 2;
        let (mut client, _, _) = client_with(Behavior::PingOnly, config);
        let watchdog = watchdog();
        client.open().await.unwrap();

        for _ in 0..3 {
            client
                .on_message(r#"{"messageType":"ping"}"#, &watchdog)
                .await
                .unwrap();
        }
        assert!(client.virtual_client().processed > 2);

        let err = client
            .on_message(r#"{"messageType":"ping","status":503}"#, &watchdog)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::Protocol(ProtocolError::Status("503".to_string()))
        );

        let flow = client
            .on_message(r#"{"messageType":"ping","status":200}"#, &watchdog)
            .await
            .unwrap();
        assert_eq!(flow, Flow::Close(CloseReason::MaxUpdates));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_protocol_error() {
        let (mut client, _, _) = client_with(Behavior::ConnClose, test_config());
        client.open().await.unwrap();

        let err = client.on_message("<html>", &watchdog()).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_register_without_endpoint_is_protocol_error() {
        let (mut client, _, _) = client_with(Behavior::ConnClose, test_config());
        let watchdog = watchdog();
        client.open().await.unwrap();

        let err = client
            .on_message(r#"{"messageType":"register","status":200}"#, &watchdog)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::MissingField { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_put_is_transport_error() {
        let (transport, _handle) = ScriptedTransport::new();
        let trigger = RecordingTrigger::failing(500);
        let mut client = ProtocolClient::new(
            transport,
            trigger,
            Behavior::OneChan,
            Arc::new(test_config()),
            StdRng::seed_from_u64(5),
        );
        let watchdog = watchdog();
        client.open().await.unwrap();
        let uaid = client.virtual_client().uaid.clone();
        let channel = client.virtual_client().channel_id.clone();
        client.on_message(&hello_reply(&uaid), &watchdog).await.unwrap();

        let err = client
            .on_message(&register_reply(&channel), &watchdog)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::PutStatus { status: 500, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latencies_are_measured() {
        let (mut client, _, _) = client_with(Behavior::ConnClose, test_config());
        let watchdog = watchdog();
        client.open().await.unwrap();
        let uaid = client.virtual_client().uaid.clone();
        let channel = client.virtual_client().channel_id.clone();

        client.on_message(&hello_reply(&uaid), &watchdog).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        client
            .on_message(&register_reply(&channel), &watchdog)
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        let flow = client
            .on_message(&notification(&channel, 1), &watchdog)
            .await
            .unwrap();

        let Flow::Close(reason) = flow else {
            panic!("expected close, got {:?}", flow);
        };
        let result = client.finish(Ok(reason));
        assert_eq!(result.registration_latency, Some(Duration::from_secs(2)));
        assert_eq!(result.notification_latencies, vec![Duration::from_secs(3)]);
        assert_eq!(result.messages_received, 3);
        assert_eq!(result.messages_sent, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_think_time_delays_dispatch() {
        let mut config = test_config();
        config.max_sleep = Duration::from_secs(10);
        let (mut client, _, _) = client_with(Behavior::PingOnly, config);
        let watchdog = watchdog();
        client.open().await.unwrap();

        let think_time = client.think_time();
        assert!(think_time < Duration::from_secs(10));

        let started = Instant::now();
        client
            .on_message(r#"{"messageType":"ping"}"#, &watchdog)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), think_time);

        // No messageType, no think time
        let started = Instant::now();
        client.on_message(r#"{"foo":1}"#, &watchdog).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fuzz_tolerates_garbage_and_resends_burst() {
        let (mut client, handle, _) = client_with(Behavior::Fuzz, test_config());
        let watchdog = watchdog();
        client.open().await.unwrap();
        assert_eq!(client.virtual_client().state, ClientState::Fuzzing);
        assert_eq!(handle.sent().len(), 10);

        for reply in ["not json", r#"{"status":401}"#, "[]", r#"{"messageType":"ping"}"#] {
            let flow = client.on_message(reply, &watchdog).await.unwrap();
            assert_eq!(flow, Flow::Continue);
        }
        assert_eq!(handle.sent().len(), 50);
    }
}
