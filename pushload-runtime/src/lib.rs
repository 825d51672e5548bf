//! Load orchestration for pushload
//!
//! [`LoadOrchestrator`] spawns one tokio task per virtual client, drains
//! their [`RunResult`](pushload_core::RunResult)s as they finish and folds
//! them into an [`AggregateResult`].

pub mod aggregate;
pub mod error;
pub mod orchestrator;

pub use aggregate::{AggregateResult, LatencyStats, OutcomeCounts, ResultCollector};
pub use error::{RuntimeError, RuntimeResult};
pub use orchestrator::{LoadOrchestrator, RunPlan};
