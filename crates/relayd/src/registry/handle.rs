//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to membership events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed` or to an
//!   empty answer

use relay_core::{CloseReason, Handle, SessionId};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{RegistryCommand, RegistryError, RegistryEvent};
use crate::session::SessionHandle;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that is injected into every session and
/// into the idle reaper. All methods communicate with the actor via channels.
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Atomically bind `handle` to `session`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlreadyTaken` if the handle is bound
    /// - `RegistryError::AlreadyBound` if the session holds another handle
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(
        &self,
        handle: Handle,
        session: SessionHandle,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                handle,
                session,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove whichever session holds `handle`.
    ///
    /// Idempotent: returns `false` when the handle is not registered or the
    /// actor is gone.
    pub async fn remove(&self, handle: Handle, reason: CloseReason) -> bool {
        self.send_remove(handle, None, reason).await
    }

    /// Remove `handle` only if it is still bound to `owner`.
    pub async fn release(&self, handle: Handle, owner: SessionId, reason: CloseReason) -> bool {
        self.send_remove(handle, Some(owner), reason).await
    }

    async fn send_remove(
        &self,
        handle: Handle,
        owner: Option<SessionId>,
        reason: CloseReason,
    ) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Remove {
                handle,
                owner,
                reason,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Session bound to `handle`, if any.
    pub async fn lookup(&self, handle: Handle) -> Option<SessionHandle> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Lookup {
                handle,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Every registered session, each once.
    ///
    /// The result is a point-in-time copy; members may join or leave while
    /// the caller iterates it. Returns an empty vector if the actor is gone.
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Every registered handle, sorted.
    pub async fn handles(&self) -> Vec<Handle> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Handles { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of registered handles.
    pub async fn len(&self) -> usize {
        self.handles().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Subscribe to membership events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = broadcast::channel(16);
        let handle = RegistryHandle::new(cmd_tx, event_tx);
        (handle, cmd_rx)
    }

    fn handle(s: &str) -> Handle {
        Handle::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_register_sends_command() {
        let (registry, mut rx) = create_test_handle();
        let (session, _out) = SessionHandle::new(SessionId::new(1), 4);

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Register {
                handle,
                session,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(handle.as_str(), "alice");
                assert_eq!(session.id(), SessionId::new(1));
                let _ = respond_to.send(Ok(()));
                return true;
            }
            false
        });

        let result = registry.register(handle("alice"), session).await;
        assert!(result.is_ok());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_register_channel_closed_error() {
        let (registry, rx) = create_test_handle();
        drop(rx);

        let (session, _out) = SessionHandle::new(SessionId::new(1), 4);
        let result = registry.register(handle("alice"), session).await;

        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_release_sends_owner() {
        let (registry, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Remove {
                handle,
                owner,
                reason,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(handle.as_str(), "alice");
                assert_eq!(owner, Some(SessionId::new(4)));
                assert_eq!(reason, CloseReason::Logout);
                let _ = respond_to.send(true);
                return true;
            }
            false
        });

        assert!(
            registry
                .release(handle("alice"), SessionId::new(4), CloseReason::Logout)
                .await
        );
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_queries_degrade_on_channel_close() {
        let (registry, rx) = create_test_handle();
        drop(rx);

        assert!(registry.lookup(handle("alice")).await.is_none());
        assert!(registry.snapshot().await.is_empty());
        assert!(registry.handles().await.is_empty());
        assert!(!registry.remove(handle("alice"), CloseReason::Removed).await);
    }

    #[tokio::test]
    async fn test_is_connected() {
        let (registry, rx) = create_test_handle();
        assert!(registry.is_connected());

        drop(rx);
        assert!(!registry.is_connected());
    }
}
