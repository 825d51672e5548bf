//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a load test against a push server
    Run {
        /// WebSocket URL of the push server
        #[arg(long, value_name = "URL")]
        server: Option<String>,

        /// Number of virtual clients
        #[arg(long, value_name = "N")]
        clients: Option<usize>,

        /// Behavior to run, or "all" for the weighted mix
        #[arg(long, value_name = "NAME")]
        scenario: Option<String>,

        /// Seed for reproducible runs
        #[arg(long, value_name = "N")]
        seed: Option<u64>,

        /// Close a connection after this many processed messages
        #[arg(long, value_name = "N")]
        max_updates: Option<u32>,

        /// Absolute per-client timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Print the aggregate result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Write the default configuration as YAML
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}
