//! wsrelay - main entry point
//!
//! Connects to the configured endpoint, logs every inbound message and keeps
//! the connection alive until a shutdown signal arrives or reconnection gives up.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tokio::{signal, sync::watch};
use tracing::{error, info};
use wsrelay::config::ManagerConfig;
use wsrelay::manager::{ConnectionManager, ConnectionState, Handler, WILDCARD};
use wsrelay::observability::{init_default_logging, HealthServer};
use wsrelay::transport::WsConnector;

const CONFIG_SEARCH_PATHS: [&str; 2] = ["wsrelay.toml", "config/wsrelay.toml"];

/// Reconnecting realtime connection manager
#[derive(Parser)]
#[command(name = "wsrelay")]
#[command(about = "Keep a WebSocket connection alive and log what arrives")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and stay connected
    Run {
        /// Endpoint URL; overrides the configuration file
        #[arg(long, env = "WSRELAY_URL")]
        url: Option<String>,
    },
    /// Validate the configuration file
    Config {
        /// Print the loaded configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting wsrelay v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Run { url } => match load_configuration(&cli.config, url.as_deref()) {
            Ok(config) => run_relay(config).await,
            Err(e) => Err(e),
        },
        Commands::Config { show } => match load_configuration(&cli.config, None) {
            Ok(config) => handle_config_command(&config, show),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
    url_override: Option<&str>,
) -> Result<ManagerConfig, Box<dyn std::error::Error>> {
    let found = match config_path {
        Some(path) => Some(path.clone()),
        None => CONFIG_SEARCH_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists()),
    };

    match (found, url_override) {
        (Some(path), _) => load_with_override(&path, url_override),
        (None, Some(url)) => Ok(ManagerConfig::for_url(url)?),
        (None, None) => Err(
            "No configuration file found. Provide one with -c/--config, create wsrelay.toml, or pass --url"
                .into(),
        ),
    }
}

/// Load `path`, then apply and re-validate the `--url` override
fn load_with_override(
    path: &Path,
    url_override: Option<&str>,
) -> Result<ManagerConfig, Box<dyn std::error::Error>> {
    info!("Loading configuration from: {}", path.display());
    let mut config = ManagerConfig::load_from_file(path)?;
    if let Some(url) = url_override {
        config.connection.url = url.to_string();
        config.validate()?;
    }
    Ok(config)
}

async fn run_relay(config: ManagerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let connector = WsConnector::new().with_connect_timeout(config.connect_timeout());
    let manager = ConnectionManager::from_config(connector, &config);

    manager.on(
        WILDCARD,
        Handler::infallible(|message| {
            info!(
                message_type = message.message_type().unwrap_or("<none>"),
                payload = %message.payload(),
                "Inbound message"
            );
        }),
    );

    if let Some(health) = &config.health {
        let server = HealthServer::new(manager.clone(), health.port);
        tokio::spawn(server.start());
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    manager.connect(&config.connection.url);
    info!(
        url = %config.connection.url,
        max_attempts = config.reconnect.max_attempts,
        "Relay running"
    );

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
        reason = wait_for_give_up(manager.subscribe_state()) => {
            error!("Connection permanently lost ({}), shutting down", reason);
            manager.disconnect();
            return Err(reason.into());
        }
    }

    manager.disconnect();
    let metrics = manager.metrics();
    info!(
        messages_received = metrics.messages_received,
        messages_sent = metrics.messages_sent,
        connections_opened = metrics.connections_opened,
        "Relay stopped"
    );
    Ok(())
}

fn handle_config_command(
    config: &ManagerConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolve once the manager stops reconnecting
async fn wait_for_give_up(mut state_rx: watch::Receiver<ConnectionState>) -> String {
    loop {
        if let ConnectionState::GivenUp(reason) = &*state_rx.borrow_and_update() {
            return reason.clone();
        }
        if state_rx.changed().await.is_err() {
            return "connection manager dropped".to_string();
        }
    }
}
