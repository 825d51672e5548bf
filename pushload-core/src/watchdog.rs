//! Per-connection absolute and idle deadlines

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Stand-in for a deadline too far out to represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(start: Instant, span: Duration) -> Instant {
    start
        .checked_add(span)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Which deadline ended the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    Absolute,
    Idle,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::Absolute => f.write_str("absolute deadline"),
            TimeoutKind::Idle => f.write_str("idle deadline"),
        }
    }
}

/// Tracks the two deadlines of one connection.
///
/// The absolute deadline is fixed at creation. The idle deadline moves every
/// time [`touch`](Self::touch) records inbound activity. Both can be tested
/// synchronously with [`check`](Self::check) or awaited with
/// [`expired`](Self::expired); dropping the `expired` future cancels its timer.
#[derive(Debug)]
pub struct TimeoutWatchdog {
    absolute_deadline: Instant,
    idle_timeout: Duration,
    last_activity: watch::Sender<Instant>,
}

impl TimeoutWatchdog {
    /// Create a watchdog whose clocks start now
    pub fn start(timeout: Duration, idle_timeout: Duration) -> Self {
        Self::starting_at(Instant::now(), timeout, idle_timeout)
    }

    /// Create a watchdog whose clocks started at `opened_at`
    pub fn starting_at(opened_at: Instant, timeout: Duration, idle_timeout: Duration) -> Self {
        let (last_activity, _) = watch::channel(opened_at);
        Self {
            absolute_deadline: deadline_after(opened_at, timeout),
            idle_timeout,
            last_activity,
        }
    }

    /// Record inbound activity, pushing the idle deadline out
    pub fn touch(&self, now: Instant) {
        self.last_activity.send_replace(now);
    }

    /// Fixed at creation; saturates instead of overflowing for huge timeouts
    pub fn absolute_deadline(&self) -> Instant {
        self.absolute_deadline
    }

    pub fn idle_deadline(&self) -> Instant {
        deadline_after(*self.last_activity.borrow(), self.idle_timeout)
    }

    /// The deadline that fires first. The absolute deadline wins ties.
    pub fn next_deadline(&self) -> (Instant, TimeoutKind) {
        let idle = self.idle_deadline();
        if self.absolute_deadline <= idle {
            (self.absolute_deadline, TimeoutKind::Absolute)
        } else {
            (idle, TimeoutKind::Idle)
        }
    }

    /// Which deadline, if any, has passed at `now`
    pub fn check(&self, now: Instant) -> Option<TimeoutKind> {
        let (deadline, kind) = self.next_deadline();
        (now >= deadline).then_some(kind)
    }

    /// Resolve once a deadline passes
    pub async fn expired(&self) -> TimeoutKind {
        let mut activity = self.last_activity.subscribe();
        loop {
            activity.borrow_and_update();
            let (deadline, kind) = self.next_deadline();

            tokio::select! {
                biased;
                changed = activity.changed() => {
                    // The sender lives in self, so this only fails while self is dropped
                    if changed.is_err() {
                        sleep_until(deadline).await;
                        return kind;
                    }
                }
                _ = sleep_until(deadline) => return kind,
            }
        }
    }
}
