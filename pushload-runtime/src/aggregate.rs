//! Aggregate statistics over a whole run

use pushload_core::{Behavior, RunOutcome, RunResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Distribution of one latency, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    /// Compute the distribution of `samples`; all zeros when empty
    pub fn from_samples(samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted: Vec<f64> = samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        sorted.sort_unstable_by(f64::total_cmp);

        let count = sorted.len();
        Self {
            count,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            mean_ms: sorted.iter().sum::<f64>() / count as f64,
            p50_ms: percentile(&sorted, 0.50),
            p95_ms: percentile(&sorted, 0.95),
            p99_ms: percentile(&sorted, 0.99),
        }
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Number of clients per outcome tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCounts {
    pub completed: usize,
    pub timed_out: usize,
    pub protocol_error: usize,
    pub transport_error: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Completed => self.completed += 1,
            RunOutcome::TimedOut => self.timed_out += 1,
            RunOutcome::ProtocolError => self.protocol_error += 1,
            RunOutcome::TransportError => self.transport_error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.timed_out + self.protocol_error + self.transport_error
    }

    /// Clients that ended in an error rather than completing or timing out
    pub fn failed(&self) -> usize {
        self.protocol_error + self.transport_error
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub total_clients: usize,
    pub outcomes: OutcomeCounts,
    pub by_behavior: BTreeMap<Behavior, OutcomeCounts>,
    pub registration_latency: LatencyStats,
    pub notification_latency: LatencyStats,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub elapsed_ms: u64,
}

impl fmt::Display for AggregateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Clients:          {}", self.total_clients)?;
        writeln!(f, "  completed:      {}", self.outcomes.completed)?;
        writeln!(f, "  timedOut:       {}", self.outcomes.timed_out)?;
        writeln!(f, "  protocolError:  {}", self.outcomes.protocol_error)?;
        writeln!(f, "  transportError: {}", self.outcomes.transport_error)?;

        writeln!(f, "By behavior:")?;
        for (behavior, counts) in &self.by_behavior {
            writeln!(
                f,
                "  {:<15} {:>6} clients, {} completed, {} timed out, {} failed",
                behavior.as_str(),
                counts.total(),
                counts.completed,
                counts.timed_out,
                counts.failed()
            )?;
        }

        write_latency(f, "Registration", &self.registration_latency)?;
        write_latency(f, "Notification", &self.notification_latency)?;

        writeln!(
            f,
            "Messages:         {} received, {} sent",
            self.messages_received, self.messages_sent
        )?;
        write!(f, "Elapsed:          {}ms", self.elapsed_ms)
    }
}

fn write_latency(f: &mut fmt::Formatter<'_>, name: &str, stats: &LatencyStats) -> fmt::Result {
    if stats.count == 0 {
        return writeln!(f, "{} latency: no samples", name);
    }
    writeln!(
        f,
        "{} latency ({} samples): min {:.1}ms, mean {:.1}ms, p50 {:.1}ms, p95 {:.1}ms, p99 {:.1}ms, max {:.1}ms",
        name,
        stats.count,
        stats.min_ms,
        stats.mean_ms,
        stats.p50_ms,
        stats.p95_ms,
        stats.p99_ms,
        stats.max_ms
    )
}

/// Folds [`RunResult`]s into an [`AggregateResult`]
#[derive(Debug, Default)]
pub struct ResultCollector {
    outcomes: OutcomeCounts,
    by_behavior: BTreeMap<Behavior, OutcomeCounts>,
    registration: Vec<Duration>,
    notification: Vec<Duration>,
    messages_received: u64,
    messages_sent: u64,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &RunResult) {
        self.count(result.outcome, Some(result.behavior));
        self.registration.extend(result.registration_latency);
        self.notification
            .extend_from_slice(&result.notification_latencies);
        self.messages_received += result.messages_received;
        self.messages_sent += result.messages_sent;
    }

    /// Count a client whose task died without producing a result
    pub fn record_failed_task(&mut self, behavior: Option<Behavior>) {
        self.count(RunOutcome::TransportError, behavior);
    }

    /// Clients recorded so far
    pub fn recorded(&self) -> usize {
        self.outcomes.total()
    }

    pub fn finish(self, elapsed: Duration) -> AggregateResult {
        AggregateResult {
            total_clients: self.outcomes.total(),
            outcomes: self.outcomes,
            by_behavior: self.by_behavior,
            registration_latency: LatencyStats::from_samples(&self.registration),
            notification_latency: LatencyStats::from_samples(&self.notification),
            messages_received: self.messages_received,
            messages_sent: self.messages_sent,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    fn count(&mut self, outcome: RunOutcome, behavior: Option<Behavior>) {
        self.outcomes.record(outcome);
        if let Some(behavior) = behavior {
            self.by_behavior.entry(behavior).or_default().record(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(behavior: Behavior, outcome: RunOutcome, latencies: &[u64]) -> RunResult {
        RunResult {
            outcome,
            behavior,
            uaid: Some("uaid".to_string()),
            registration_latency: Some(Duration::from_millis(10)),
            notification_latencies: latencies.iter().map(|ms| Duration::from_millis(*ms)).collect(),
            messages_received: 3,
            messages_sent: 4,
            messages_processed: 3,
            detail: String::new(),
            duration: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_latency_stats() {
        let samples: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        let stats = LatencyStats::from_samples(&samples);

        assert_eq!(stats.count, 100);
        assert_eq!(stats.min_ms, 1.0);
        assert_eq!(stats.max_ms, 100.0);
        assert!((stats.mean_ms - 50.5).abs() < 1e-9);
        assert_eq!(stats.p50_ms, 51.0);
        assert_eq!(stats.p95_ms, 95.0);
        assert_eq!(stats.p99_ms, 99.0);
    }

    #[test]
    fn test_empty_latency_stats() {
        assert_eq!(LatencyStats::from_samples(&[]), LatencyStats::default());
    }

    #[test]
    fn test_collector_counts() {
        let mut collector = ResultCollector::new();
        collector.record(&result(Behavior::ConnClose, RunOutcome::Completed, &[20]));
        collector.record(&result(Behavior::OneChan, RunOutcome::Completed, &[30, 40]));
        collector.record(&result(Behavior::OneChan, RunOutcome::TimedOut, &[]));
        collector.record_failed_task(Some(Behavior::Fuzz));
        collector.record_failed_task(None);
        assert_eq!(collector.recorded(), 5);

        let aggregate = collector.finish(Duration::from_millis(1500));
        assert_eq!(aggregate.total_clients, 5);
        assert_eq!(aggregate.outcomes.completed, 2);
        assert_eq!(aggregate.outcomes.timed_out, 1);
        assert_eq!(aggregate.outcomes.transport_error, 2);
        assert_eq!(aggregate.by_behavior[&Behavior::OneChan].total(), 2);
        assert_eq!(aggregate.by_behavior[&Behavior::Fuzz].transport_error, 1);
        assert_eq!(aggregate.registration_latency.count, 3);
        assert_eq!(aggregate.notification_latency.count, 3);
        assert_eq!(aggregate.notification_latency.max_ms, 40.0);
        assert_eq!(aggregate.messages_sent, 12);
        assert_eq!(aggregate.elapsed_ms, 1500);
    }

    #[test]
    fn test_report_text() {
        let mut collector = ResultCollector::new();
        collector.record(&result(Behavior::PingLoop, RunOutcome::Completed, &[5]));
        let report = collector.finish(Duration::from_millis(10)).to_string();

        assert!(report.contains("completed:      1"));
        assert!(report.contains("ping_loop"));
        assert!(report.contains("Notification latency (1 samples)"));
    }
}
