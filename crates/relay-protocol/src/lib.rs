//! Relay Protocol - Wire protocol for chat relay clients
//!
//! The protocol is line-oriented UTF-8 text. Each line carries one command
//! (client to server) or one response (server to client) and is terminated
//! by `\r\n`; a bare `\n` is accepted on input.
//!
//! ```text
//! client                         server
//!   LOGIN alice          ──▶
//!                        ◀──     OK
//!                        ◀──     INFO alice connected
//!   MSG hello   world    ──▶
//!                        ◀──     MSG alice hello world
//!   DM bob psst          ──▶
//!                        ◀──     ERR user-not-found
//! ```

pub mod command;
pub mod reply;

pub use command::{parse_login, split_command, Command};
pub use reply::{ErrorCode, Reply};

/// Terminator appended to every outbound line.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Default upper bound on one inbound line, excluding the terminator.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;
