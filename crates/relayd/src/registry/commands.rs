//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for observers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use relay_core::{CloseReason, Handle, SessionId};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::session::SessionHandle;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Bind a handle to a session.
    ///
    /// # Errors
    /// - `RegistryError::AlreadyTaken` if another session holds the handle
    Register {
        handle: Handle,
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove a handle.
    ///
    /// With `owner` set, the entry is removed only if it belongs to that
    /// session, so a late shutdown can never evict a newer holder of the
    /// same handle. Responds with whether an entry was removed.
    Remove {
        handle: Handle,
        owner: Option<SessionId>,
        reason: CloseReason,
        respond_to: oneshot::Sender<bool>,
    },

    /// Look up the session bound to a handle.
    Lookup {
        handle: Handle,
        respond_to: oneshot::Sender<Option<SessionHandle>>,
    },

    /// All registered sessions, each exactly once.
    Snapshot {
        respond_to: oneshot::Sender<Vec<SessionHandle>>,
    },

    /// All registered handles, sorted.
    Handles {
        respond_to: oneshot::Sender<Vec<Handle>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The handle is bound to another active session.
    #[error("handle already taken: {0}")]
    AlreadyTaken(Handle),

    /// The session is already bound to a different handle.
    #[error("session already bound to another handle: {0}")]
    AlreadyBound(SessionId),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Registry Events
// ============================================================================

/// Membership changes published by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A handle was bound.
    Joined {
        handle: Handle,
        session_id: SessionId,
    },

    /// A handle was released.
    Left {
        handle: Handle,
        session_id: SessionId,
        reason: CloseReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::AlreadyTaken(Handle::parse("alice").unwrap());
        assert_eq!(err.to_string(), "handle already taken: alice");

        let err = RegistryError::AlreadyBound(SessionId::new(3));
        assert_eq!(
            err.to_string(),
            "session already bound to another handle: session-3"
        );

        let err = RegistryError::ChannelClosed;
        assert_eq!(err.to_string(), "response channel closed");
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        let (tx, rx) = oneshot::channel::<Result<(), RegistryError>>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
