//! Runtime error types

use pushload_config::ConfigError;
use pushload_core::BehaviorError;
use thiserror::Error;

/// Errors raised while preparing a run.
///
/// Failures of individual clients never surface here; they are outcomes in
/// the aggregate.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Invalid behavior mix: {0}")]
    Behavior(#[from] BehaviorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
