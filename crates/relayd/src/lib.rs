//! Relay Daemon - Session registry, protocol state machine and idle reaper
//!
//! This crate provides the runtime of the chat relay:
//! - `registry` - Registry actor owning the handle → session table
//! - `session` - Per-connection login handshake, command loop and writer
//! - `reaper` - Periodic eviction of idle sessions
//! - `server` - TCP accept loop tying the pieces together
//! - `config` - Server tunables
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        relayd                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   RelayServer   │     │       RegistryActor         │    │
//! │  │  (TcpListener)  │     │  (handle table owner)       │    │
//! │  └────────┬────────┘     └──────────────▲──────────────┘    │
//! │           │ accept                      │ commands          │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐  lines  ┌──────────┴──────────────┐    │
//! │  │     Session     │────────▶│       Dispatcher        │    │
//! │  │  (per client)   │         │  MSG / WHO / DM / PING  │    │
//! │  └────────┬────────┘         └─────────────────────────┘    │
//! │           │ outbound queue                                  │
//! │           ▼                                                 │
//! │  ┌─────────────────┐         ┌─────────────────────────┐    │
//! │  │  writer task    │         │       IdleReaper        │    │
//! │  │  (per client)   │         │  (periodic sweep)       │    │
//! │  └─────────────────┘         └─────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod reaper;
pub mod registry;
pub mod server;
pub mod session;
