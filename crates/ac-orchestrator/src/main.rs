//! agent-coder daemon
//!
//! Keeps the session catalogue in SQLite and serves the IPC interface the
//! CLI uses to create, start and talk to sessions.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ac_core::config::{self, AgentCoderConfig};
use ac_core::ipc_auth;
use ac_orchestrator::ipc::IpcServer;
use ac_orchestrator::store::SqliteStore;
use ac_orchestrator::DaemonState;

#[derive(Parser)]
#[command(name = "agent-coderd")]
#[command(about = "agent-coder session daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IPC port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Database file (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("agent-coder daemon starting...");

    // Load configuration
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = match AgentCoderConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) if args.config.is_some() => {
            return Err(e).with_context(|| format!("Failed to load config from {:?}", config_path));
        }
        Err(e) => {
            tracing::warn!("Failed to load config from {:?}: {}", config_path, e);
            AgentCoderConfig::default()
        }
    };

    if let Some(port) = args.port {
        config.ipc_port = port;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    tracing::info!("Using database {:?}", config.database_path);

    let address = config.ipc_address();
    let state = Arc::new(DaemonState::new(config, Arc::new(store)));

    // Token the CLI must present
    let token = ipc_auth::generate_token();
    let token_path = ipc_auth::default_token_path();
    ipc_auth::write_token(&token_path, &token)
        .with_context(|| format!("Failed to write IPC token to {:?}", token_path))?;

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let server = IpcServer::new(address, Arc::clone(&state))
        .with_auth_token(token)
        .with_shutdown_token(cancel.clone());
    let served = server.run().await;

    // Let running sessions wind down before exiting
    state.sessions.shutdown().await;
    if let Err(e) = ipc_auth::remove_token(&token_path) {
        tracing::warn!("Failed to remove IPC token: {}", e);
    }

    served?;
    tracing::info!("Daemon shutdown complete");
    Ok(())
}
