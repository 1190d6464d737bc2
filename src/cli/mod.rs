//! CLI command handling.
//!
//! Provides subcommands for:
//! - Starting the test database and printing its parameters (`start`)
//! - Restarting it, or starting it if absent (`restart`)
//! - Removing container and network (`stop`)
//! - Printing parameters without touching Docker (`params`)
//! - Checking Docker availability (`doctor`)

use std::process::ExitCode;

use clap::{Args, ColorChoice, Parser, Subcommand};

use crate::config::{ConnectionParameters, DatabaseBackend, EnvLookup, HarnessConfig};
use crate::engine::detect::check_docker;
use crate::error::{ConfigError, HarnessError};
use crate::lifecycle::TestDatabase;

/// Prefix for `KEY=value` output lines.
const ENV_PREFIX: &str = "DB_";

#[derive(Parser, Debug)]
#[command(name = "itdb")]
#[command(about = "Ephemeral database containers for integration tests")]
#[command(
    long_about = "Provision and tear down a throwaway database container.\nExamples:\n  itdb start --port 3806  # Start and print DB_* variables\n  eval \"$(itdb start)\"    # Export them into the shell\n  itdb stop"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Print connection parameters as JSON instead of KEY=value lines
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the database and wait until it answers
    Start,
    /// Restart the database, or start it if it does not exist
    Restart,
    /// Remove the container and network
    Stop,
    /// Print connection parameters without contacting Docker
    Params,
    /// Check whether Docker is installed and running
    Doctor,
}

/// Flags that override environment configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Database backend (mysql or postgres)
    #[arg(long, global = true)]
    pub backend: Option<DatabaseBackend>,

    /// Image reference to run
    #[arg(long, global = true)]
    pub image: Option<String>,

    /// Container name
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Bridge network name
    #[arg(long, global = true)]
    pub network: Option<String>,

    /// Host port mapped to the database port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Database name
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Id of the container this command runs in, to attach to the network
    #[arg(long, global = true)]
    pub current_container: Option<String>,

    /// Skip waiting for the database to answer
    #[arg(long, global = true)]
    pub no_verify: bool,
}

impl ConfigOverrides {
    /// Resolve configuration: backend defaults, then environment, then flags.
    pub fn resolve(&self, lookup: EnvLookup<'_>) -> Result<HarnessConfig, ConfigError> {
        let config = match self.backend {
            Some(backend) => HarnessConfig::for_backend(backend).apply_env(lookup)?,
            None => HarnessConfig::resolve(lookup)?,
        };
        let config = self.apply(config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, mut config: HarnessConfig) -> HarnessConfig {
        if let Some(ref image) = self.image {
            config.image = image.clone();
        }
        if let Some(ref name) = self.name {
            config.container_name = name.clone();
        }
        if let Some(ref network) = self.network {
            config.network_name = network.clone();
        }
        if let Some(port) = self.port {
            config.host_port = port;
        }
        if let Some(ref database) = self.database {
            config.db_name = database.clone();
        }
        if let Some(ref id) = self.current_container {
            config.current_container_id = Some(id.clone());
        }
        if self.no_verify {
            config.verify_connection = false;
        }
        config
    }
}

fn render_params(params: &ConnectionParameters, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(params)? + "\n")
    } else {
        Ok(params.to_env_lines(ENV_PREFIX))
    }
}

impl Cli {
    /// Configuration for the chosen command. `doctor` reads none, so a bad
    /// `ITDB_*` value cannot stop it from running.
    pub fn config(&self, lookup: EnvLookup<'_>) -> Result<Option<HarnessConfig>, ConfigError> {
        match self.command {
            Command::Doctor => Ok(None),
            _ => self.overrides.resolve(lookup).map(Some),
        }
    }
}

async fn connect(config: HarnessConfig) -> anyhow::Result<TestDatabase> {
    match TestDatabase::connect(config).await {
        Ok(db) => Ok(db),
        Err(HarnessError::DockerNotAvailable { reason }) => {
            let detection = check_docker().await;
            if let Some(hint) = detection.hint() {
                eprintln!("Docker is {}. {}", detection.status, hint);
            }
            anyhow::bail!("Docker not available: {reason}")
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_doctor() -> ExitCode {
    let detection = check_docker().await;
    println!("Docker: {}", detection.status);
    if let Some(ref host) = detection.docker_host {
        println!("DOCKER_HOST: {host}");
    }
    if let Some(ref reason) = detection.reason {
        println!("Error: {reason}");
    }
    match detection.hint() {
        Some(hint) => {
            println!("{hint}");
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}

/// Run a parsed command, resolving configuration through `lookup`.
pub async fn run_command(cli: &Cli, lookup: EnvLookup<'_>) -> anyhow::Result<ExitCode> {
    let Some(config) = cli.config(lookup)? else {
        return Ok(run_doctor().await);
    };

    match cli.command {
        Command::Params => {
            print!("{}", render_params(&config.connection_parameters(), cli.json)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Start | Command::Restart => {
            let db = connect(config).await?;
            let params = if cli.command == Command::Start {
                db.start().await?
            } else {
                db.restart().await?
            };

            match params {
                Some(params) => {
                    print!("{}", render_params(&params, cli.json)?);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    match db.last_verification().await.and_then(|r| r.to_error()) {
                        Some(e) => eprintln!("{e}"),
                        None => eprintln!("Database did not become ready"),
                    }
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Stop => {
            let db = connect(config).await?;
            let report = db.stop().await;
            for failure in &report.failures {
                eprintln!("warning: {:?} failed: {}", failure.step, failure.error);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Doctor => Ok(run_doctor().await),
    }
}
