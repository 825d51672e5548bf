use anyhow::Result;
use pushload_config::domains::logging::{LogFormat, LoggingConfig};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Whether the global subscriber has been installed by this crate
pub fn is_initialized() -> bool {
    INITIALIZED.get().is_some()
}

/// Initialize logging from configuration.
///
/// `level_override` (typically `--log-level` from the CLI) wins over the
/// configured level. Output goes to stderr so stdout stays free for reports.
/// Only the first call in a process installs a subscriber; later calls are
/// no-ops.
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    if is_initialized() {
        return Ok(());
    }

    let level = level_override
        .map(str::to_string)
        .unwrap_or_else(|| config.level.to_string());
    let env_filter = build_filter(&level);

    // Use try_init to avoid panic if a global subscriber is already set
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_line_number(config.include_location)
            .with_file(config.include_location)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_line_number(config.include_location)
            .with_file(config.include_location)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_line_number(config.include_location)
            .with_file(config.include_location)
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    let _ = INITIALIZED.set(());
    Ok(())
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    init_logging(&LoggingConfig::default(), Some(log_level))
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
