//! Command execution for active sessions.
//!
//! The dispatcher turns one non-blank input line into its effect on the
//! registry and on the target sessions. Argument errors are answered with
//! an `ERR` line and never end the session.

use relay_core::{CloseReason, Handle};
use relay_protocol::{Command, ErrorCode, Reply};
use tracing::debug;

use crate::registry::RegistryHandle;
use crate::session::SessionHandle;

/// Executes commands on behalf of one logged-in session.
pub struct Dispatcher<'a> {
    registry: &'a RegistryHandle,
    session: &'a SessionHandle,
    from: &'a Handle,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a RegistryHandle, session: &'a SessionHandle, from: &'a Handle) -> Self {
        Self {
            registry,
            session,
            from,
        }
    }

    /// Parses and executes one line.
    pub async fn dispatch(&self, line: &str) {
        match Command::parse(line) {
            Ok(command) => {
                debug!(handle = %self.from, command = command.name(), "Dispatching");
                self.execute(command).await;
            }
            Err(code) => {
                debug!(handle = %self.from, error = %code, "Rejected command");
                self.reply(Reply::Error(code)).await;
            }
        }
    }

    async fn execute(&self, command: Command) {
        match command {
            Command::Msg { text } => self.broadcast(text).await,
            Command::Who => self.who().await,
            Command::Dm { target, text } => self.direct(target, text).await,
            Command::Ping => {
                self.reply(Reply::Pong).await;
            }
            Command::Logout => {
                self.reply(Reply::Ok).await;
                self.session.close(CloseReason::Logout);
            }
        }
    }

    /// Sends to every registered session, the sender included.
    async fn broadcast(&self, text: String) {
        let reply = Reply::Msg {
            from: self.from.clone(),
            text,
        };
        let line = reply.to_wire();

        let recipients = self.registry.snapshot().await;
        let mut delivered = 0usize;
        for recipient in &recipients {
            if recipient.send_line(line.clone()) {
                delivered += 1;
            }
        }

        debug!(
            handle = %self.from,
            recipients = recipients.len(),
            delivered,
            "Broadcast message"
        );
    }

    async fn who(&self) {
        for handle in self.registry.handles().await {
            if !self.reply(Reply::User(handle)).await {
                break;
            }
        }
    }

    async fn direct(&self, target: Handle, text: String) {
        let Some(recipient) = self.registry.lookup(target.clone()).await else {
            self.reply(Reply::Error(ErrorCode::UserNotFound)).await;
            return;
        };

        recipient.send(&Reply::Dm {
            from: self.from.clone(),
            text,
        });
        debug!(from = %self.from, to = %target, "Direct message");
        self.reply(Reply::Ok).await;
    }

    async fn reply(&self, reply: Reply) -> bool {
        self.session.reply(&reply).await
    }
}
