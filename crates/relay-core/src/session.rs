//! Session lifecycle value objects.

use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Process-unique identifier for one accepted connection.
///
/// Handles can be reused after logout; the session id cannot, so it is
/// what ties a registry entry to the session that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Session State (3-State Model)
// ============================================================================

/// Protocol state of a session.
///
/// ```text
/// AwaitingLogin ──login ok──▶ Active ──▶ Closed
///       │                                   ▲
///       └──────── bad / taken login ────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Connected, no handle bound yet.
    #[default]
    AwaitingLogin,

    /// Handle registered, commands accepted.
    Active,

    /// Terminal. Stream released, registry entry gone.
    Closed,
}

impl SessionState {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitingLogin => "awaiting-login",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    /// Legal transitions of the protocol state machine.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::AwaitingLogin, Self::Active)
                | (Self::AwaitingLogin, Self::Closed)
                | (Self::Active, Self::Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Close Reasons
// ============================================================================

/// Why a session was shut down.
///
/// Shutdown can be requested from several places at once (the session's
/// own read loop, the idle reaper, a failed write); only the first reason
/// recorded for a session is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Client sent `LOGOUT`.
    Logout,

    /// Stream reached end-of-file.
    Disconnected,

    /// Reading from the stream failed.
    ReadFailed,

    /// Writing to the stream failed or timed out.
    WriteFailed,

    /// Client sent a line longer than the configured maximum.
    LineTooLong,

    /// Outbound queue overflowed; the client is not reading.
    SlowConsumer,

    /// No input for longer than the idle threshold.
    IdleTimeout,

    /// No login line arrived in time.
    LoginTimeout,

    /// Malformed login line or invalid handle.
    Protocol,

    /// Requested handle was already bound.
    UsernameTaken,

    /// Entry removed from the registry by an operator.
    Removed,

    /// Server-wide shutdown.
    ServerShutdown,
}

impl CloseReason {
    /// Short reason tag used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::Disconnected => "eof",
            Self::ReadFailed => "read-failed",
            Self::WriteFailed => "send-failed",
            Self::LineTooLong => "line-too-long",
            Self::SlowConsumer => "slow-consumer",
            Self::IdleTimeout => "idle-timeout",
            Self::LoginTimeout => "login-timeout",
            Self::Protocol => "protocol",
            Self::UsernameTaken => "username-taken",
            Self::Removed => "removed",
            Self::ServerShutdown => "server-shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
