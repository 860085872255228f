//! Relay Core - Shared types for the chat relay
//!
//! This crate provides the core domain types shared between
//! the wire protocol (relay-protocol) and the daemon (relayd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod handle;
pub mod session;
pub mod text;

// Re-exports for convenience
pub use error::HandleError;
pub use handle::Handle;
pub use session::{CloseReason, SessionId, SessionState};
pub use text::normalize_text;
