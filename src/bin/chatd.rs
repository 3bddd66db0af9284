//! Chat daemon - single-room line-oriented chat server
//!
//! Clients connect over TCP, pick a unique display name, and every line
//! they send is relayed to everyone in the room.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address (0.0.0.0:9001)
//! chatd
//!
//! # Listen elsewhere
//! chatd --bind 127.0.0.1:7000
//! CHAT_BIND=127.0.0.1:7000 chatd
//!
//! # Load settings from a file
//! chatd --config /etc/chatd.toml
//!
//! # Enable debug logging
//! RUST_LOG=chatd=debug chatd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: stop accepting, close the port, exit

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatd::config::ServerConfig;
use chatd::registry::spawn_registry;
use chatd::server::ChatServer;

/// Log directives used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "chatd=info,chat_core=info,chat_protocol=info";

/// Chat daemon - single-room broadcast chat server
#[derive(Parser, Debug)]
#[command(name = "chatd", version, about)]
struct Args {
    /// Address to listen on (overrides config file and CHAT_BIND)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Args {
    /// Resolves the effective configuration: defaults, file, env, flags.
    fn server_config(&self) -> Result<ServerConfig> {
        let config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        let config = config
            .with_env_overrides()
            .context("Invalid CHAT_BIND")?;

        match &self.bind {
            Some(bind) => config.with_bind_str(bind).context("Invalid --bind"),
            None => Ok(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    let config = args.server_config()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        bind = %config.bind,
        "Chat daemon starting"
    );

    // Create cancellation token for shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry();
    info!("Name registry started");

    let server = ChatServer::bind(&config, registry, cancel_token)
        .await
        .context("Failed to start server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Chat daemon stopped");
    Ok(())
}

/// Builds the log filter: `RUST_LOG` when set and valid, otherwise the defaults.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
