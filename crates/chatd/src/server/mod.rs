//! TCP server for the chat daemon.
//!
//! The server:
//! - Listens on a TCP port for client connections
//! - Spawns a `Session` task for each client
//! - Stops accepting on shutdown via CancellationToken, leaving in-flight
//!   sessions to finish on their own
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │  TcpListener    │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Session     │────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and allow continued operation

mod session;

pub use session::{CloseReason, Session, SessionError, SessionLimits, SessionReport};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use chat_core::SessionId;

use crate::config::ServerConfig;
use crate::registry::RegistryHandle;

/// Wait after a failed `accept` before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// TCP server for the chat daemon.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Handle to the shared registry
    registry: RegistryHandle,

    /// Cancellation token for shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating session IDs
    connection_counter: AtomicU64,

    /// Limits applied to every session
    limits: SessionLimits,
}

impl ChatServer {
    /// Binds the listener described by `config`.
    ///
    /// Binding happens here rather than in `run` so callers learn about an
    /// unusable address immediately, and can read the actual port when
    /// binding to port 0.
    pub async fn bind(
        config: &ServerConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.bind,
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            limits: SessionLimits::from(config),
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// drops the listener, closing the port. Sessions already running are
    /// not interrupted.
    pub async fn run(self) -> Result<(), ServerError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(addr = %addr, "Chat server is running");
        }

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, SessionId::new(conn_num));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            if !accept_backoff(&self.cancel_token).await {
                                info!("Server shutdown requested");
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!(
            connections = self.connection_counter.load(Ordering::Relaxed),
            "Listener closed"
        );
        Ok(())
    }

    /// Handles a new client connection by spawning a session task.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, session_id: SessionId) {
        debug!(session_id = %session_id, peer = %peer, "Accepted connection");

        if let Err(e) = stream.set_nodelay(true) {
            debug!(session_id = %session_id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let session = Session::new(
            session_id,
            reader,
            writer,
            self.registry.clone(),
            self.limits,
        );

        tokio::spawn(async move {
            let report = session.run().await;
            debug!(
                session_id = %report.session_id,
                reason = ?report.reason,
                "Session finished"
            );
        });
    }
}

/// Pauses after a failed accept so a persistent failure, such as running
/// out of file descriptors, does not spin the loop.
///
/// Returns false if shutdown was requested while waiting.
async fn accept_backoff(cancel_token: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel_token.cancelled() => false,
        _ = sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("I/O error: {0}")]
    Io(String),
}
