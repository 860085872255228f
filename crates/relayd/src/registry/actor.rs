//! Registry actor - owns the handle table and processes commands.
//!
//! The RegistryActor is the single owner of membership state. It receives
//! commands via an mpsc channel, publishes events via broadcast, and sends
//! the join/leave announcements to connected sessions.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel send failures are ignored (the requester went away), never panic

use std::collections::HashMap;

use relay_core::{CloseReason, Handle, SessionId};
use relay_protocol::Reply;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use super::commands::{RegistryCommand, RegistryError, RegistryEvent};
use crate::session::SessionHandle;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all handle bindings.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to subscribers.
///
/// # Atomicity
///
/// Commands are handled one at a time in a single task, so the
/// check-then-insert of a registration cannot interleave with any other
/// register or remove.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Handle → session bindings
    sessions: HashMap<Handle, SessionHandle>,

    /// Event publisher for observers
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                handle,
                session,
                respond_to,
            } => {
                let result = self.handle_register(handle, session);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove {
                handle,
                owner,
                reason,
                respond_to,
            } => {
                let removed = self.handle_remove(&handle, owner, reason);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Lookup { handle, respond_to } => {
                let _ = respond_to.send(self.sessions.get(&handle).cloned());
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.sessions.values().cloned().collect());
            }
            RegistryCommand::Handles { respond_to } => {
                let mut handles: Vec<Handle> = self.sessions.keys().cloned().collect();
                handles.sort();
                let _ = respond_to.send(handles);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_register(
        &mut self,
        handle: Handle,
        session: SessionHandle,
    ) -> Result<(), RegistryError> {
        if self.sessions.contains_key(&handle) {
            debug!(
                handle = %handle,
                session = %session.id(),
                "Handle already taken, rejecting registration"
            );
            return Err(RegistryError::AlreadyTaken(handle));
        }

        if !session.bind(handle.clone()) {
            return Err(RegistryError::AlreadyBound(session.id()));
        }

        // The newcomer's login reply is queued while it is still unreachable,
        // so no other traffic can overtake it. One entry keeps the two lines
        // together in a queue of any capacity.
        let announcement = Reply::connected(&handle);
        session.send_line(format!(
            "{}{}",
            Reply::Ok.to_wire(),
            announcement.to_wire()
        ));

        for member in self.sessions.values() {
            member.send(&announcement);
        }

        let session_id = session.id();
        self.sessions.insert(handle.clone(), session);

        info!(
            handle = %handle,
            session = %session_id,
            total_sessions = self.sessions.len(),
            "Session registered"
        );

        // Publish event (ignore if no subscribers)
        let _ = self
            .event_publisher
            .send(RegistryEvent::Joined { handle, session_id });

        Ok(())
    }

    fn handle_remove(
        &mut self,
        handle: &Handle,
        owner: Option<SessionId>,
        reason: CloseReason,
    ) -> bool {
        let owned = match (self.sessions.get(handle), owner) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(session), Some(owner)) => session.id() == owner,
        };

        if !owned {
            debug!(handle = %handle, owner = ?owner, "Nothing to remove");
            return false;
        }

        let Some(session) = self.sessions.remove(handle) else {
            return false;
        };

        // An entry only exists for an active session, so dropping it ends
        // the session too. No-op when the session is already closing.
        session.close(reason);

        let announcement = Reply::disconnected(handle);
        for member in self.sessions.values() {
            member.send(&announcement);
        }

        info!(
            handle = %handle,
            session = %session.id(),
            reason = %reason,
            remaining_sessions = self.sessions.len(),
            "Session removed"
        );

        let _ = self.event_publisher.send(RegistryEvent::Left {
            handle: handle.clone(),
            session_id: session.id(),
            reason,
        });

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OutboundReceiver;

    fn create_actor() -> (RegistryActor, broadcast::Receiver<RegistryEvent>) {
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        (RegistryActor::new(cmd_rx, event_tx), event_rx)
    }

    fn handle(s: &str) -> Handle {
        Handle::parse(s).unwrap()
    }

    fn session(id: u64) -> (SessionHandle, OutboundReceiver) {
        SessionHandle::new(SessionId::new(id), 16)
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(entry) = rx.try_recv() {
            lines.extend(entry.lines().map(str::to_string));
        }
        lines
    }

    #[tokio::test]
    async fn test_register_and_reject_duplicate() {
        let (mut actor, _events) = create_actor();
        let (alice, _ra) = session(1);
        let (impostor, _ri) = session(2);

        assert!(actor.handle_register(handle("alice"), alice).is_ok());

        let result = actor.handle_register(handle("alice"), impostor.clone());
        assert!(matches!(result, Err(RegistryError::AlreadyTaken(_))));
        assert!(impostor.handle().is_none());
        assert_eq!(actor.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_register_replies_to_newcomer_and_announces() {
        let (mut actor, _events) = create_actor();
        let (alice, mut alice_rx) = session(1);
        let (bob, mut bob_rx) = session(2);

        actor.handle_register(handle("alice"), alice).unwrap();
        assert_eq!(drain(&mut alice_rx), vec!["OK", "INFO alice connected"]);

        actor.handle_register(handle("bob"), bob).unwrap();
        assert_eq!(drain(&mut alice_rx), vec!["INFO bob connected"]);
        assert_eq!(drain(&mut bob_rx), vec!["OK", "INFO bob connected"]);
    }

    #[tokio::test]
    async fn test_remove_announces_and_closes() {
        let (mut actor, _events) = create_actor();
        let (alice, mut alice_rx) = session(1);
        let (bob, _bob_rx) = session(2);

        actor.handle_register(handle("alice"), alice).unwrap();
        actor.handle_register(handle("bob"), bob.clone()).unwrap();
        drain(&mut alice_rx);

        assert!(actor.handle_remove(&handle("bob"), None, CloseReason::Logout));
        assert!(bob.is_closed());
        assert_eq!(drain(&mut alice_rx), vec!["INFO bob disconnected"]);

        // Idempotent
        assert!(!actor.handle_remove(&handle("bob"), None, CloseReason::Logout));
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_remove_with_owner_spares_new_holder() {
        let (mut actor, _events) = create_actor();
        let (current, _rx) = session(9);

        actor.handle_register(handle("alice"), current.clone()).unwrap();

        // A stale session with the same handle must not evict the holder
        let removed = actor.handle_remove(
            &handle("alice"),
            Some(SessionId::new(3)),
            CloseReason::Disconnected,
        );
        assert!(!removed);
        assert!(!current.is_closed());
        assert!(actor.sessions.contains_key("alice"));

        assert!(actor.handle_remove(
            &handle("alice"),
            Some(SessionId::new(9)),
            CloseReason::Disconnected
        ));
    }

    #[tokio::test]
    async fn test_events_published() {
        let (mut actor, mut events) = create_actor();
        let (alice, _rx) = session(1);

        actor.handle_register(handle("alice"), alice).unwrap();
        actor.handle_remove(&handle("alice"), None, CloseReason::IdleTimeout);

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::Joined {
                handle: handle("alice"),
                session_id: SessionId::new(1)
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::Left {
                handle: handle("alice"),
                session_id: SessionId::new(1),
                reason: CloseReason::IdleTimeout
            }
        );
    }

    #[tokio::test]
    async fn test_session_bound_to_other_handle_is_refused() {
        let (mut actor, _events) = create_actor();
        let (alice, _rx) = session(1);

        actor.handle_register(handle("alice"), alice.clone()).unwrap();
        let result = actor.handle_register(handle("alias"), alice);
        assert!(matches!(result, Err(RegistryError::AlreadyBound(_))));
        assert!(!actor.sessions.contains_key("alias"));
    }
}
