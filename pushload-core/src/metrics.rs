//! Per-connection timestamps and the result emitted at close

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::behavior::Behavior;
use crate::error::ClientError;
use crate::watchdog::TimeoutKind;

/// Terminal outcome of one virtual client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    Completed,
    TimedOut,
    ProtocolError,
    TransportError,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::TimedOut => "timedOut",
            RunOutcome::ProtocolError => "protocolError",
            RunOutcome::TransportError => "transportError",
        };
        f.write_str(name)
    }
}

/// Why a connection that did not fail was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The behavior script reached its terminal step
    BehaviorComplete,
    /// The processed-message ceiling was exceeded
    MaxUpdates,
    /// A deadline passed
    TimedOut(TimeoutKind),
}

impl CloseReason {
    pub fn outcome(&self) -> RunOutcome {
        match self {
            CloseReason::BehaviorComplete | CloseReason::MaxUpdates => RunOutcome::Completed,
            CloseReason::TimedOut(_) => RunOutcome::TimedOut,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::BehaviorComplete => f.write_str("behavior complete"),
            CloseReason::MaxUpdates => f.write_str("message ceiling reached"),
            CloseReason::TimedOut(kind) => write!(f, "{} reached", kind),
        }
    }
}

/// Everything known about one virtual client once it has closed
#[derive(Debug, Clone)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub behavior: Behavior,
    /// `None` when the connection never opened
    pub uaid: Option<String>,
    pub registration_latency: Option<Duration>,
    pub notification_latencies: Vec<Duration>,
    pub messages_received: u64,
    pub messages_sent: u64,
    /// Inbound messages that made it through dispatch
    pub messages_processed: u32,
    /// Close reason for completed or timed out clients, error text otherwise
    pub detail: String,
    pub duration: Duration,
}

impl RunResult {
    /// Result for a client whose connection could not be opened
    pub fn connect_failed(behavior: Behavior, error: &ClientError, duration: Duration) -> Self {
        Self {
            outcome: outcome_for_error(error),
            behavior,
            uaid: None,
            registration_latency: None,
            notification_latencies: Vec::new(),
            messages_received: 0,
            messages_sent: 0,
            messages_processed: 0,
            detail: error.to_string(),
            duration,
        }
    }
}

/// Map an engine error to its outcome tag
pub fn outcome_for_error(error: &ClientError) -> RunOutcome {
    match error {
        ClientError::Protocol(_) => RunOutcome::ProtocolError,
        ClientError::Transport(_) => RunOutcome::TransportError,
    }
}

/// Timestamps of one connection.
///
/// Only raw instants are stored; latencies are derived in
/// [`finish`](Self::finish) so that a missing or out-of-order pair yields
/// no sample rather than a zero.
#[derive(Debug)]
pub struct MetricsRecorder {
    connected_at: Instant,
    registered_at: Option<Instant>,
    outstanding_puts: VecDeque<Instant>,
    notifications: Vec<(Instant, Instant)>,
    received: u64,
    sent: u64,
}

impl MetricsRecorder {
    /// Create a recorder for a connection opened at `connected_at`
    pub fn new(connected_at: Instant) -> Self {
        Self {
            connected_at,
            registered_at: None,
            outstanding_puts: VecDeque::new(),
            notifications: Vec::new(),
            received: 0,
            sent: 0,
        }
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Record a register response. Only the first one counts.
    pub fn record_registered(&mut self, at: Instant) {
        self.registered_at.get_or_insert(at);
    }

    pub fn record_put_sent(&mut self, at: Instant) {
        self.outstanding_puts.push_back(at);
    }

    /// Pair a notification with the oldest PUT still waiting for one
    pub fn record_notified(&mut self, at: Instant) {
        if let Some(put_at) = self.outstanding_puts.pop_front() {
            self.notifications.push((put_at, at));
        }
    }

    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn registration_latency(&self) -> Option<Duration> {
        self.registered_at
            .and_then(|at| at.checked_duration_since(self.connected_at))
    }

    pub fn notification_latencies(&self) -> Vec<Duration> {
        self.notifications
            .iter()
            .filter_map(|(put_at, notified_at)| notified_at.checked_duration_since(*put_at))
            .collect()
    }

    /// Build the result for this connection
    pub fn finish(
        &self,
        outcome: RunOutcome,
        behavior: Behavior,
        uaid: String,
        messages_processed: u32,
        detail: String,
        closed_at: Instant,
    ) -> RunResult {
        RunResult {
            outcome,
            behavior,
            uaid: Some(uaid),
            registration_latency: self.registration_latency(),
            notification_latencies: self.notification_latencies(),
            messages_received: self.received,
            messages_sent: self.sent,
            messages_processed,
            detail,
            duration: closed_at.saturating_duration_since(self.connected_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latencies_from_timestamps() {
        let t0 = Instant::now();
        let mut recorder = MetricsRecorder::new(t0);
        recorder.record_registered(t0 + Duration::from_secs(2));
        recorder.record_registered(t0 + Duration::from_secs(9));
        recorder.record_put_sent(t0 + Duration::from_secs(2));
        recorder.record_notified(t0 + Duration::from_secs(5));

        assert_eq!(recorder.registration_latency(), Some(Duration::from_secs(2)));
        assert_eq!(
            recorder.notification_latencies(),
            vec![Duration::from_secs(3)]
        );
    }

    #[test]
    fn test_missing_latencies_are_absent() {
        let t0 = Instant::now();
        let mut recorder = MetricsRecorder::new(t0);
        recorder.record_put_sent(t0 + Duration::from_secs(1));

        // Notification without a matching PUT adds nothing
        let mut other = MetricsRecorder::new(t0);
        other.record_notified(t0 + Duration::from_secs(1));

        assert_eq!(recorder.registration_latency(), None);
        assert!(recorder.notification_latencies().is_empty());
        assert!(other.notification_latencies().is_empty());
    }

    #[test]
    fn test_negative_latency_is_absent() {
        let t0 = Instant::now();
        let mut recorder = MetricsRecorder::new(t0 + Duration::from_secs(5));
        recorder.record_registered(t0);
        recorder.record_put_sent(t0 + Duration::from_secs(3));
        recorder.record_notified(t0 + Duration::from_secs(1));

        assert_eq!(recorder.registration_latency(), None);
        assert!(recorder.notification_latencies().is_empty());
    }

    #[test]
    fn test_close_reason_outcomes() {
        assert_eq!(
            CloseReason::BehaviorComplete.outcome(),
            RunOutcome::Completed
        );
        assert_eq!(CloseReason::MaxUpdates.outcome(), RunOutcome::Completed);
        assert_eq!(
            CloseReason::TimedOut(TimeoutKind::Idle).outcome(),
            RunOutcome::TimedOut
        );
        assert_eq!(RunOutcome::TimedOut.to_string(), "timedOut");
    }
}
