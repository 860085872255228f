//! TCP server for the chat relay.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a [`Session`] task for each client
//! - Runs the idle reaper alongside the sessions
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │     Session     │────▶│  RegistryHandle │◀────│   IdleReaper    │
//! │   (per client)  │     │                 │     │   (periodic)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the loop keeps going

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use relay_core::SessionId;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::reaper::spawn_reaper;
use crate::registry::RegistryHandle;
use crate::session::Session;

/// How long shutdown waits for sessions to flush and close.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// TCP server for the chat relay.
pub struct RelayServer {
    config: ServerConfig,

    /// Handle to the session registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating session ids
    connection_counter: AtomicU64,

    /// Session tasks still running
    sessions: TaskTracker,
}

impl RelayServer {
    /// Creates a new relay server.
    ///
    /// # Arguments
    ///
    /// * `config` - Listener address and session tunables
    /// * `registry` - Handle to the session registry
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(
        config: ServerConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            sessions: TaskTracker::new(),
        }
    }

    /// Binds the configured address and serves until cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.config.validate()?;

        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.config.validate()?;

        match listener.local_addr() {
            Ok(addr) => info!(addr = %addr, "Relay server listening"),
            Err(e) => warn!(error = %e, "Relay server listening on unknown address"),
        }

        let reaper = spawn_reaper(
            self.registry.clone(),
            self.config.idle_timeout,
            self.config.reap_interval,
            self.cancel_token.clone(),
        );

        // Accept connections until cancelled
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed) + 1;
                            self.handle_connection(stream, peer, SessionId::new(conn_num));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        drop(listener);
        self.shutdown(reaper).await;
        Ok(())
    }

    /// Spawns a session task for a freshly accepted stream.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, id: SessionId) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(session = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let session = Session::new(
            id,
            reader,
            writer,
            self.registry.clone(),
            &self.config,
            self.cancel_token.child_token(),
        );

        debug!(session = %id, peer = %peer, "Accepted connection");
        self.sessions.spawn(async move {
            let reason = session.run().await;
            debug!(session = %id, reason = %reason, "Session task finished");
        });
    }

    /// Waits for the reaper and all sessions to wind down.
    async fn shutdown(&self, reaper: tokio::task::JoinHandle<()>) {
        self.sessions.close();

        if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, self.sessions.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.sessions.len(),
                "Sessions still running after grace period"
            );
        }

        if let Err(e) = reaper.await {
            warn!(error = %e, "Idle reaper task failed");
        }

        info!("Server cleanup complete");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}
