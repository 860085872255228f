//! Outbound side of a session: the shareable handle and its writer task.
//!
//! Every line destined for a client goes through a bounded queue owned by
//! that client's writer task. The task is the only code that touches the
//! write half of the stream, so lines from concurrent senders (a broadcast
//! and a direct reply, say) never interleave their bytes.
//!
//! # Slow consumers
//!
//! Enqueueing never waits. When a recipient's queue is full the recipient
//! is closed with `CloseReason::SlowConsumer`; the sender carries on.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Queue and stream failures close the affected session only

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use relay_core::{CloseReason, Handle, SessionId};
use relay_protocol::Reply;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Receiving end of a session's outbound queue.
pub type OutboundReceiver = mpsc::Receiver<String>;

// ============================================================================
// Activity Clock
// ============================================================================

/// Monotonic last-activity timestamp with a single writer.
///
/// Stored as milliseconds since the clock was created so the reaper can
/// read it without taking a lock.
#[derive(Debug)]
struct ActivityClock {
    origin: Instant,
    last_ms: AtomicU64,
}

impl ActivityClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_ms.store(elapsed, Ordering::Release);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Acquire));
        self.origin.elapsed().saturating_sub(last)
    }
}

// ============================================================================
// Session Handle
// ============================================================================

#[derive(Debug)]
struct Shared {
    id: SessionId,
    handle: OnceLock<Handle>,
    outbound: mpsc::Sender<String>,
    closed: CancellationToken,
    close_reason: OnceLock<CloseReason>,
    activity: ActivityClock,
}

/// Cheap-to-clone reference to one session.
///
/// This is what the registry stores and what broadcasts iterate over. It
/// can enqueue lines, request shutdown, and report idleness, but it never
/// owns the stream.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Shared>,
}

impl SessionHandle {
    /// Creates a handle with an outbound queue of `capacity` lines.
    ///
    /// The receiver is normally handed to [`spawn_writer`].
    pub fn new(id: SessionId, capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            inner: Arc::new(Shared {
                id,
                handle: OnceLock::new(),
                outbound: tx,
                closed: CancellationToken::new(),
                close_reason: OnceLock::new(),
                activity: ActivityClock::new(),
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Handle bound at login, if any.
    pub fn handle(&self) -> Option<&Handle> {
        self.inner.handle.get()
    }

    /// Binds the login handle. A handle can be bound once; later calls
    /// with a different handle are refused.
    pub(crate) fn bind(&self, handle: Handle) -> bool {
        match self.inner.handle.set(handle) {
            Ok(()) => true,
            Err(rejected) => self.inner.handle.get() == Some(&rejected),
        }
    }

    /// Enqueues one reply without waiting.
    ///
    /// Returns `false` if the line was not queued: the session is closed
    /// or its queue overflowed (which closes it).
    pub fn send(&self, reply: &Reply) -> bool {
        self.send_line(reply.to_wire())
    }

    /// Enqueues an already-terminated line without waiting.
    pub fn send_line(&self, line: String) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.inner.outbound.try_send(line) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    session = %self.id(),
                    handle = ?self.handle(),
                    "Outbound queue full, closing slow consumer"
                );
                self.close(CloseReason::SlowConsumer);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Enqueues a reply to this session's own client, waiting for room.
    ///
    /// Called only from the session's own task. A full queue is not treated
    /// as a slow consumer here. Returns `false` once the session is closed.
    pub async fn reply(&self, reply: &Reply) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner.outbound.send(reply.to_wire()).await.is_ok()
    }

    /// Requests shutdown.
    ///
    /// Safe to call from any task, any number of times. Returns `true`
    /// only for the call that recorded the reason.
    pub fn close(&self, reason: CloseReason) -> bool {
        let first = self.inner.close_reason.set(reason).is_ok();
        if first {
            debug!(session = %self.id(), reason = %reason, "Session close requested");
        }
        self.inner.closed.cancel();
        first
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// The first reason passed to [`close`](Self::close).
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.close_reason.get().copied()
    }

    /// Resolves once shutdown has been requested.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// Advances the activity clock. Called only by the session's own
    /// read loop after a line arrives.
    pub(crate) fn touch(&self) {
        self.inner.activity.touch();
    }

    /// Time since the last line was read from this session.
    pub fn idle_for(&self) -> Duration {
        self.inner.activity.idle_for()
    }

    /// Whether two handles refer to the same session.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ============================================================================
// Writer Task
// ============================================================================

/// Spawns the task that drains `rx` into `writer`.
///
/// Runs until the session is closed, then writes whatever is still queued
/// (so a final `ERR` or inactivity notice reaches the client) and shuts the
/// write half down. A failed or timed-out write closes the session with
/// `CloseReason::WriteFailed`.
pub fn spawn_writer<W>(
    writer: W,
    rx: OutboundReceiver,
    session: SessionHandle,
    write_timeout: Duration,
) -> tokio::task::JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(run_writer(BufWriter::new(writer), rx, session, write_timeout))
}

async fn run_writer<W>(
    mut writer: BufWriter<W>,
    mut rx: OutboundReceiver,
    session: SessionHandle,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut healthy = true;

    loop {
        tokio::select! {
            biased;

            line = rx.recv() => {
                let Some(line) = line else { break };
                if let Err(e) = write_line(&mut writer, &line, write_timeout).await {
                    debug!(session = %session.id(), error = %e, "Write failed");
                    session.close(CloseReason::WriteFailed);
                    healthy = false;
                    break;
                }
            }

            _ = session.closed() => break,
        }
    }

    // Refuse new lines, then flush what was queued before the close.
    rx.close();
    if healthy {
        while let Some(line) = rx.recv().await {
            if write_line(&mut writer, &line, write_timeout).await.is_err() {
                break;
            }
        }
    }

    let _ = timeout(write_timeout, writer.shutdown()).await;
    debug!(session = %session.id(), "Writer stopped");
}

async fn write_line<W>(
    writer: &mut BufWriter<W>,
    line: &str,
    write_timeout: Duration,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    };

    match timeout(write_timeout, write).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "write timed out",
        )),
    }
}
