//! mqtt-secrets - Main Entry Point
//!
//! Resolves marker-prefixed environment values from AWS Secrets Manager,
//! then runs a single MQTT session until a shutdown signal arrives.

use clap::{Parser, Subcommand};
use mqtt_secrets::config::{load_env_file, BridgeConfig, ConfigError};
use mqtt_secrets::error::BridgeResult;
use mqtt_secrets::observability::init_default_logging;
use mqtt_secrets::secrets::{resolve_environment, AwsSecretStore, ResolvedEnv};
use mqtt_secrets::session::{Session, SessionSettings};
use mqtt_secrets::transport::mqtt::{InboundMessage, MqttClient, MqttSettings};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Inbound message buffer between the event loop and the logger task
const INBOUND_CAPACITY: usize = 32;

/// Connect to MQTT with credentials resolved from AWS Secrets Manager
#[derive(Parser)]
#[command(name = "mqtt-secrets")]
#[command(about = "Connect to MQTT with credentials resolved from AWS Secrets Manager")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "MQTT_SECRETS_CONFIG")]
    config: Option<PathBuf>,

    /// Load environment variables from this file instead of .env
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace) when LOG_LEVEL is unset
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve secrets, connect, greet and wait for a shutdown signal
    Run,
    /// Resolve secrets and print the names of substituted variables
    Resolve,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Before logging so LOG_* variables can come from the file
    let env_file_result = load_env_file(cli.env_file.as_deref(), Path::new("."));

    init_default_logging(cli.verbose);

    info!("Starting mqtt-secrets v{}", env!("CARGO_PKG_VERSION"));

    let result = match env_file_result {
        Ok(applied) => {
            if let Some(path) = applied {
                info!("Loaded environment from: {}", path.display());
            }
            run_command(cli).await
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        error!("{}", e.sanitized_message());
        process::exit(1);
    }

    info!("Application shutdown complete");
}

async fn run_command(cli: Cli) -> BridgeResult<()> {
    let (config, source) = BridgeConfig::discover(cli.config.as_deref(), Path::new("."))?;
    match source {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("No configuration file found, using built-in defaults"),
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bridge(config).await,
        Commands::Resolve => print_substituted(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    }
}

/// Completes on the first SIGINT or SIGTERM.
/// Handlers are installed immediately, replacing the default termination.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
    })
}

async fn resolve(config: &BridgeConfig) -> BridgeResult<ResolvedEnv> {
    let env = ResolvedEnv::capture_process();
    let store = AwsSecretStore::from_env(config.secrets.region.clone()).await;
    resolve_environment(&store, &config.secrets, &env).await
}

async fn run_bridge(config: BridgeConfig) -> BridgeResult<()> {
    let shutdown = shutdown_signal()?;
    tokio::pin!(shutdown);

    let resolved = tokio::select! {
        resolved = resolve(&config) => resolved?,
        () = &mut shutdown => return Ok(()),
    };
    let settings = MqttSettings::from_env(&config.mqtt, &resolved)?;
    let client = MqttClient::new(settings)?;

    let (message_tx, message_rx) = mpsc::channel(INBOUND_CAPACITY);
    client.set_message_sender(message_tx).await;
    let consumer = tokio::spawn(log_inbound_messages(message_rx));

    let mut session = Session::new(SessionSettings::from(&config.mqtt), client);
    let result = match session.start_until(&mut shutdown).await {
        Ok(true) => session.run_until(&mut shutdown).await,
        Ok(false) => session.shutdown().await.map_err(Into::into),
        Err(e) => Err(e.into()),
    };

    consumer.abort();
    result
}

async fn print_substituted(config: BridgeConfig) -> BridgeResult<()> {
    let resolved = resolve(&config).await?;
    if resolved.substituted().is_empty() {
        warn!("No environment variables reference the secret bundle");
    }
    for name in resolved.substituted() {
        println!("{name}");
    }
    Ok(())
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> BridgeResult<()> {
    if show {
        let rendered = toml::to_string_pretty(config).map_err(ConfigError::from)?;
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}

async fn log_inbound_messages(mut messages: mpsc::Receiver<InboundMessage>) {
    while let Some(message) = messages.recv().await {
        info!(
            topic = %message.topic,
            retain = message.retain,
            "Message received: {}",
            message.payload_text()
        );
    }
}
