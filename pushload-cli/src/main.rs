use anyhow::{Context, Result};
use clap::Parser;
use pushload_config::{ConfigLoader, PushloadConfig};
use pushload_runtime::{LoadOrchestrator, RunPlan};
use pushload_transport::{HttpPushTrigger, WsConnector};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

mod cli;
use cli::{Cli, Commands, ConfigCommands};

/// Command-line values that take precedence over file and environment
#[derive(Debug, Default)]
struct RunOverrides {
    server: Option<String>,
    clients: Option<usize>,
    scenario: Option<String>,
    seed: Option<u64>,
    max_updates: Option<u32>,
    timeout: Option<u64>,
}

impl RunOverrides {
    fn apply(self, config: &mut PushloadConfig) {
        if let Some(server) = self.server {
            config.target.server_url = server;
        }
        if let Some(clients) = self.clients {
            config.load.clients = clients;
        }
        if let Some(scenario) = self.scenario {
            config.scenario.selected = scenario;
        }
        if self.seed.is_some() {
            config.load.seed = self.seed;
        }
        if let Some(max_updates) = self.max_updates {
            config.client.max_updates = max_updates;
        }
        if let Some(timeout) = self.timeout {
            config.client.timeout = Duration::from_secs(timeout);
        }
    }
}

/// Where the configuration came from, reported once logging is up
#[derive(Debug, PartialEq)]
enum ConfigSource {
    File(PathBuf),
    MissingFile(PathBuf),
    Environment,
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {:?}", path),
            ConfigSource::MissingFile(path) => {
                warn!("Configuration file not found: {:?}. Using defaults.", path)
            }
            ConfigSource::Environment => {
                debug!("No configuration file specified. Loading from environment or defaults.")
            }
        }
    }
}

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<(PushloadConfig, ConfigSource)> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) if path.exists() => {
            let config = loader
                .from_file(path)
                .context(format!("Failed to load configuration from {:?}", path))?;
            Ok((config, ConfigSource::File(path.clone())))
        }
        Some(path) => {
            let config = loader
                .from_env()
                .context("Failed to load configuration from environment")?;
            Ok((config, ConfigSource::MissingFile(path.clone())))
        }
        None => {
            let config = loader
                .from_env()
                .context("Failed to load configuration from environment")?;
            Ok((config, ConfigSource::Environment))
        }
    }
}

/// Run one load test and print the aggregate
async fn run_command(config: PushloadConfig, json: bool) -> Result<()> {
    let plan = RunPlan::from_config(&config).context("Invalid run configuration")?;
    let trigger =
        HttpPushTrigger::with_config(&config.http).context("Failed to create HTTP trigger")?;
    let connector = WsConnector::from_config(&config.target);
    let orchestrator = LoadOrchestrator::from_config(connector, trigger, &config);

    let result = tokio::select! {
        result = orchestrator.run_plan(&plan) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning the run");
            return Err(anyhow::anyhow!("Load run interrupted"));
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else {
        println!("{}", result);
    }
    Ok(())
}

/// Handle configuration validation
fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match load_config(Some(config_file)) {
        Ok(_config) => {
            println!("Configuration file is valid");
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

/// Handle configuration generation
fn handle_config_generate(output: &PathBuf, force: bool) -> Result<()> {
    info!("Generating configuration at: {:?}", output);

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(output, PushloadConfig::generate_sample())
        .context(format!("Failed to write configuration to {:?}", output))?;
    println!("Configuration written to {:?}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) = load_config(cli.config.as_ref())?;
    pushload_logging::init_logging(&config.logging, cli.log_level.as_deref())?;
    source.log();

    match cli.command {
        Commands::Run {
            server,
            clients,
            scenario,
            seed,
            max_updates,
            timeout,
            json,
        } => {
            let mut config = config;
            RunOverrides {
                server,
                clients,
                scenario,
                seed,
                max_updates,
                timeout,
            }
            .apply(&mut config);
            run_command(config, json).await
        }
        Commands::Config { config_cmd } => match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(&config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(&output, force),
        },
    }
}
