//! Server-to-client lines.

use std::fmt;

use relay_core::Handle;
use thiserror::Error;

use crate::LINE_TERMINATOR;

/// Reason codes carried by `ERR` lines.
///
/// The `Display` form is the exact token sent on the wire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[error("invalid-protocol")]
    InvalidProtocol,

    #[error("invalid-username")]
    InvalidUsername,

    #[error("username-taken")]
    UsernameTaken,

    #[error("empty-message")]
    EmptyMessage,

    #[error("dm-invalid")]
    DmInvalid,

    #[error("user-not-found")]
    UserNotFound,

    #[error("unknown-command")]
    UnknownCommand,
}

/// One line sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK`
    Ok,

    /// `ERR <code>`
    Error(ErrorCode),

    /// `USER <handle>`, one per active handle in a WHO listing
    User(Handle),

    /// `MSG <from> <text>`
    Msg { from: Handle, text: String },

    /// `DM <from> <text>`
    Dm { from: Handle, text: String },

    /// `INFO <text>`
    Info(String),

    /// `PONG`
    Pong,
}

impl Reply {
    pub fn connected(handle: &Handle) -> Self {
        Self::Info(format!("{handle} connected"))
    }

    pub fn disconnected(handle: &Handle) -> Self {
        Self::Info(format!("{handle} disconnected"))
    }

    pub fn inactivity() -> Self {
        Self::Info("you have been disconnected due to inactivity".to_string())
    }

    /// Renders the line including its terminator.
    pub fn to_wire(&self) -> String {
        format!("{self}{LINE_TERMINATOR}")
    }
}

impl From<ErrorCode> for Reply {
    fn from(code: ErrorCode) -> Self {
        Self::Error(code)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Error(code) => write!(f, "ERR {code}"),
            Self::User(handle) => write!(f, "USER {handle}"),
            Self::Msg { from, text } => write!(f, "MSG {from} {text}"),
            Self::Dm { from, text } => write!(f, "DM {from} {text}"),
            Self::Info(text) => write!(f, "INFO {text}"),
            Self::Pong => f.write_str("PONG"),
        }
    }
}
