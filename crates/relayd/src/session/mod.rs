//! Per-connection session: login handshake, command loop, shutdown.
//!
//! Each accepted stream gets its own `Session` running on its own task:
//! - Waits for `LOGIN <handle>` and registers the handle
//! - Reads lines and hands them to the [`Dispatcher`]
//! - Tears down exactly once, whoever asked for it
//!
//! # Lifecycle
//!
//! ```text
//!  accept ──▶ AwaitingLogin ──LOGIN ok──▶ Active ──▶ Closed
//!                  │                                   ▲
//!                  └──── bad/taken login, EOF ─────────┘
//! ```
//!
//! Shutdown can be requested from outside (idle reaper, logout, a failed
//! write, server cancellation) through [`SessionHandle::close`]; the
//! session's own task notices and runs the teardown, so registry removal
//! and stream release happen once, on one task.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Stream errors end only this session

mod codec;
mod dispatch;
mod outbound;

pub use codec::LossyLinesCodec;
pub use dispatch::Dispatcher;
pub use outbound::{spawn_writer, OutboundReceiver, SessionHandle};

use std::time::Duration;

use futures::StreamExt;
use relay_core::{CloseReason, Handle, SessionId, SessionState};
use relay_protocol::{parse_login, ErrorCode, Reply};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::registry::{RegistryError, RegistryHandle};

/// What woke the read loop.
enum Inbound {
    Line(String),
    Closed(CloseReason),
}

/// One connected client.
pub struct Session<R> {
    id: SessionId,

    /// Inbound lines, CR/LF stripped
    lines: FramedRead<R, LossyLinesCodec>,

    /// Shared reference to this session (outbound queue, close signal)
    outbound: SessionHandle,

    /// Task owning the write half
    writer: Option<JoinHandle<()>>,

    registry: RegistryHandle,

    /// Server-wide cancellation
    shutdown: CancellationToken,

    login_timeout: Duration,
    write_timeout: Duration,

    state: SessionState,

    /// Handle bound at login
    user: Option<Handle>,
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a session over the two halves of a stream.
    ///
    /// The writer task starts immediately; nothing is read until
    /// [`run`](Self::run).
    pub fn new<W>(
        id: SessionId,
        reader: R,
        writer: W,
        registry: RegistryHandle,
        config: &ServerConfig,
        shutdown: CancellationToken,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, rx) = SessionHandle::new(id, config.queue_capacity);
        let writer = spawn_writer(writer, rx, outbound.clone(), config.write_timeout);
        let codec = LossyLinesCodec::new_with_max_length(config.max_line_length);

        Self {
            id,
            lines: FramedRead::new(reader, codec),
            outbound,
            writer: Some(writer),
            registry,
            shutdown,
            login_timeout: config.login_timeout,
            write_timeout: config.write_timeout,
            state: SessionState::AwaitingLogin,
            user: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Shareable reference to this session.
    pub fn handle(&self) -> &SessionHandle {
        &self.outbound
    }

    /// Runs the session to completion and returns why it closed.
    pub async fn run(mut self) -> CloseReason {
        debug!(session = %self.id, "Client connected");

        let reason = match self.login().await {
            Ok(()) => self.command_loop().await,
            Err(reason) => reason,
        };

        self.close(reason).await
    }

    /// Handles the `LOGIN` handshake.
    ///
    /// Any failure has already been answered on the wire when this returns.
    async fn login(&mut self) -> Result<(), CloseReason> {
        let line = match timeout(self.login_timeout, self.next_line()).await {
            Ok(Inbound::Line(line)) => line,
            Ok(Inbound::Closed(reason)) => return Err(reason),
            Err(_) => {
                debug!(session = %self.id, "No login before timeout");
                return Err(CloseReason::LoginTimeout);
            }
        };

        let handle = match parse_login(&line) {
            Ok(handle) => handle,
            Err(code) => {
                debug!(session = %self.id, error = %code, "Login rejected");
                self.outbound.reply(&Reply::Error(code)).await;
                return Err(CloseReason::Protocol);
            }
        };

        match self
            .registry
            .register(handle.clone(), self.outbound.clone())
            .await
        {
            Ok(()) => {}
            Err(RegistryError::AlreadyTaken(taken)) => {
                debug!(session = %self.id, handle = %taken, "Handle already taken");
                self.outbound
                    .reply(&Reply::Error(ErrorCode::UsernameTaken))
                    .await;
                return Err(CloseReason::UsernameTaken);
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Registration failed");
                return Err(CloseReason::ServerShutdown);
            }
        }

        // The registry queued OK and our own announcement.
        self.user = Some(handle.clone());
        self.transition(SessionState::Active);

        info!(session = %self.id, handle = %handle, "Client logged in");
        Ok(())
    }

    /// Reads and dispatches lines until something closes the session.
    async fn command_loop(&mut self) -> CloseReason {
        let Some(from) = self.user.clone() else {
            return CloseReason::Protocol;
        };

        loop {
            match self.next_line().await {
                Inbound::Line(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    Dispatcher::new(&self.registry, &self.outbound, &from)
                        .dispatch(&line)
                        .await;
                }
                Inbound::Closed(reason) => return reason,
            }
        }
    }

    /// Waits for the next line or a reason to stop.
    ///
    /// A pending close request wins over buffered input. Every line read
    /// successfully, blank ones included, advances the activity clock.
    async fn next_line(&mut self) -> Inbound {
        enum Wake {
            Closed,
            Shutdown,
            Frame(Option<Result<String, AnyDelimiterCodecError>>),
        }

        let wake = tokio::select! {
            biased;
            _ = self.outbound.closed() => Wake::Closed,
            _ = self.shutdown.cancelled() => Wake::Shutdown,
            frame = self.lines.next() => Wake::Frame(frame),
        };

        match wake {
            Wake::Closed => {
                Inbound::Closed(self.outbound.close_reason().unwrap_or(CloseReason::Removed))
            }
            Wake::Shutdown => Inbound::Closed(CloseReason::ServerShutdown),
            Wake::Frame(Some(Ok(line))) => {
                self.outbound.touch();
                Inbound::Line(line)
            }
            Wake::Frame(Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded))) => {
                debug!(session = %self.id, "Line exceeds maximum length");
                Inbound::Closed(CloseReason::LineTooLong)
            }
            Wake::Frame(Some(Err(AnyDelimiterCodecError::Io(e)))) => {
                debug!(session = %self.id, error = %e, "Read failed");
                Inbound::Closed(CloseReason::ReadFailed)
            }
            Wake::Frame(None) => Inbound::Closed(CloseReason::Disconnected),
        }
    }

    /// Tears the session down.
    ///
    /// Releases the registry entry (announcing the departure) if the
    /// session logged in, then lets the writer flush queued lines and
    /// close the write half. The read half is dropped with `self`.
    async fn close(mut self, reason: CloseReason) -> CloseReason {
        self.outbound.close(reason);
        let reason = self.outbound.close_reason().unwrap_or(reason);

        if let Some(handle) = self.user.take() {
            self.registry.release(handle, self.id, reason).await;
        }

        if let Some(mut writer) = self.writer.take() {
            // Each write is individually bounded; this only guards against
            // a long backlog on a stalled peer.
            if timeout(self.write_timeout, &mut writer).await.is_err() {
                warn!(session = %self.id, "Writer did not finish in time, aborting");
                writer.abort();
            }
        }

        self.transition(SessionState::Closed);
        info!(session = %self.id, reason = %reason, "Session closed");
        reason
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.can_transition_to(next) {
            debug!(session = %self.id, from = %self.state, to = %next, "State transition");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::spawn_registry;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    struct Peer {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\r\n").await.unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await.unwrap();
            (n > 0).then(|| line.trim_end_matches(['\r', '\n']).to_string())
        }
    }

    fn spawn_session(
        id: u64,
        registry: &RegistryHandle,
        config: &ServerConfig,
    ) -> (Peer, JoinHandle<CloseReason>) {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, client_write) = tokio::io::split(client);

        let session = Session::new(
            SessionId::new(id),
            server_read,
            server_write,
            registry.clone(),
            config,
            CancellationToken::new(),
        );
        assert_eq!(session.state(), SessionState::AwaitingLogin);
        assert_eq!(session.id(), SessionId::new(id));

        let task = tokio::spawn(session.run());
        let peer = Peer {
            reader: BufReader::new(client_read),
            writer: client_write,
        };
        (peer, task)
    }

    #[tokio::test]
    async fn test_login_success_then_logout() {
        let registry = spawn_registry();
        let config = ServerConfig::default();
        let (mut peer, task) = spawn_session(1, &registry, &config);

        peer.send("LOGIN alice").await;
        assert_eq!(peer.recv().await.as_deref(), Some("OK"));
        assert_eq!(peer.recv().await.as_deref(), Some("INFO alice connected"));
        assert_eq!(registry.handles().await, vec![Handle::parse("alice").unwrap()]);

        peer.send("LOGOUT").await;
        assert_eq!(peer.recv().await.as_deref(), Some("OK"));
        assert_eq!(peer.recv().await, None);

        assert_eq!(task.await.unwrap(), CloseReason::Logout);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_malformed_login_closes_without_registering() {
        let registry = spawn_registry();
        let config = ServerConfig::default();
        let (mut peer, task) = spawn_session(1, &registry, &config);

        peer.send("HELLO").await;
        assert_eq!(peer.recv().await.as_deref(), Some("ERR invalid-protocol"));
        assert_eq!(peer.recv().await, None);
        assert_eq!(task.await.unwrap(), CloseReason::Protocol);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_handle_with_space_is_invalid_username() {
        let registry = spawn_registry();
        let config = ServerConfig::default();
        let (mut peer, task) = spawn_session(1, &registry, &config);

        peer.send("LOGIN al ice").await;
        assert_eq!(peer.recv().await.as_deref(), Some("ERR invalid-username"));
        assert_eq!(peer.recv().await, None);
        assert_eq!(task.await.unwrap(), CloseReason::Protocol);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_taken_handle_leaves_holder_untouched() {
        let registry = spawn_registry();
        let config = ServerConfig::default();
        let (mut holder, _holder_task) = spawn_session(1, &registry, &config);
        let (mut late, late_task) = spawn_session(2, &registry, &config);

        holder.send("LOGIN alice").await;
        assert_eq!(holder.recv().await.as_deref(), Some("OK"));
        assert_eq!(holder.recv().await.as_deref(), Some("INFO alice connected"));

        late.send("LOGIN alice").await;
        assert_eq!(late.recv().await.as_deref(), Some("ERR username-taken"));
        assert_eq!(late.recv().await, None);
        assert_eq!(late_task.await.unwrap(), CloseReason::UsernameTaken);

        holder.send("PING").await;
        assert_eq!(holder.recv().await.as_deref(), Some("PONG"));
        assert_eq!(registry.handles().await.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let registry = spawn_registry();
        let config = ServerConfig::default();
        let (mut peer, _task) = spawn_session(1, &registry, &config);

        peer.send("LOGIN alice").await;
        peer.recv().await;
        peer.recv().await;

        peer.send("").await;
        peer.send("   ").await;
        peer.send("ping").await;
        assert_eq!(peer.recv().await.as_deref(), Some("PONG"));
    }

    #[tokio::test]
    async fn test_eof_releases_handle_and_announces() {
        let registry = spawn_registry();
        let config = ServerConfig::default();
        let (mut watcher, _watcher_task) = spawn_session(1, &registry, &config);
        let (mut leaver, leaver_task) = spawn_session(2, &registry, &config);

        watcher.send("LOGIN watcher").await;
        watcher.recv().await;
        watcher.recv().await;

        leaver.send("LOGIN leaver").await;
        leaver.recv().await;
        assert_eq!(watcher.recv().await.as_deref(), Some("INFO leaver connected"));

        drop(leaver);
        assert_eq!(leaver_task.await.unwrap(), CloseReason::Disconnected);
        assert_eq!(watcher.recv().await.as_deref(), Some("INFO leaver disconnected"));

        // Handle is free again
        let (mut again, _again_task) = spawn_session(3, &registry, &config);
        again.send("LOGIN leaver").await;
        assert_eq!(again.recv().await.as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn test_eof_before_login_closes_silently() {
        let registry = spawn_registry();
        let config = ServerConfig::default();
        let (peer, task) = spawn_session(1, &registry, &config);

        drop(peer);
        assert_eq!(task.await.unwrap(), CloseReason::Disconnected);
    }

    #[tokio::test]
    async fn test_overlong_line_closes_session() {
        let registry = spawn_registry();
        let config = ServerConfig {
            max_line_length: 16,
            ..ServerConfig::default()
        };
        let (mut peer, task) = spawn_session(1, &registry, &config);

        peer.send("LOGIN alice").await;
        peer.recv().await;
        peer.recv().await;

        peer.send(&format!("MSG {}", "x".repeat(64))).await;
        assert_eq!(task.await.unwrap(), CloseReason::LineTooLong);
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_timeout() {
        let registry = spawn_registry();
        let config = ServerConfig {
            login_timeout: Duration::from_secs(5),
            ..ServerConfig::default()
        };
        let (_peer, task) = spawn_session(1, &registry, &config);

        assert_eq!(task.await.unwrap(), CloseReason::LoginTimeout);
    }

    #[tokio::test]
    async fn test_external_close_runs_teardown() {
        let registry = spawn_registry();
        let config = ServerConfig::default();
        let (mut peer, task) = spawn_session(1, &registry, &config);

        peer.send("LOGIN alice").await;
        peer.recv().await;
        peer.recv().await;

        let handle = registry.lookup(Handle::parse("alice").unwrap()).await.unwrap();
        handle.close(CloseReason::IdleTimeout);
        handle.close(CloseReason::Removed);

        assert_eq!(task.await.unwrap(), CloseReason::IdleTimeout);
        assert_eq!(peer.recv().await, None);
        assert!(registry.is_empty().await);
    }
}
