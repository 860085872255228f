//! Relay Daemon - line-oriented chat relay
//!
//! Accepts TCP connections, authenticates each under a unique handle and
//! relays text between handles by broadcast and direct message.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (4000)
//! relayd
//!
//! # Listen on a specific port
//! relayd 5555
//!
//! # Port from the environment (the argument wins when both are given)
//! CHAT_PORT=5555 relayd
//!
//! # Evict clients after 5 minutes of silence
//! relayd --idle-timeout 300
//!
//! # Enable debug logging
//! RUST_LOG=relayd=debug relayd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::env;
use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relay_protocol::DEFAULT_MAX_LINE_LENGTH;
use relayd::config::{
    resolve_port, ServerConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_QUEUE_CAPACITY, PORT_ENV_VAR,
};
use relayd::registry::spawn_registry;
use relayd::server::RelayServer;

/// Line-oriented chat relay
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about)]
struct Args {
    /// Port to listen on (overrides CHAT_PORT)
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Seconds of silence before a client is disconnected
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout: u64,

    /// Seconds between idle sweeps (defaults to the idle timeout)
    #[arg(long)]
    reap_interval: Option<u64>,

    /// Seconds a new connection has to log in (defaults to the idle timeout)
    #[arg(long)]
    login_timeout: Option<u64>,

    /// Lines buffered per client before it is dropped as too slow
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Longest accepted input line in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    max_line_length: usize,
}

impl Args {
    fn into_config(self, port: u16) -> ServerConfig {
        let idle_timeout = Duration::from_secs(self.idle_timeout);
        ServerConfig {
            bind: self.bind,
            port,
            idle_timeout,
            reap_interval: self
                .reap_interval
                .map(Duration::from_secs)
                .unwrap_or(idle_timeout),
            login_timeout: self
                .login_timeout
                .map(Duration::from_secs)
                .unwrap_or(idle_timeout),
            queue_capacity: self.queue_capacity,
            max_line_length: self.max_line_length,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay_core=info".parse()?)
                .add_directive("relay_protocol=info".parse()?),
        )
        .init();

    let env_port = env::var(PORT_ENV_VAR).ok();
    let (port, rejected) = resolve_port(args.port, env_port.as_deref());
    if let Some(raw) = rejected {
        warn!(var = PORT_ENV_VAR, value = %raw, port, "Ignoring unparsable port");
    }

    let config = args.into_config(port);
    config.validate().context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.socket_addr(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "Relay daemon starting"
    );

    // Create cancellation token for graceful shutdown
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

    // Spawn the session registry
    let registry = spawn_registry();

    // Create and run the server
    let server = RelayServer::new(config, registry, cancel_token);

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e).context("Relay server failed");
    }

    info!("Relay daemon stopped");
    Ok(())
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
