//! Parsing of client lines into commands.

use relay_core::{normalize_text, Handle};

use crate::reply::ErrorCode;

/// Splits a trimmed line into its command token and the remainder.
///
/// The remainder starts at the first non-whitespace character after the
/// token and is empty when the line has a single token.
pub fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim_start()),
        None => (line, ""),
    }
}

/// Parses the handshake line.
///
/// The keyword is case-insensitive. A line that is not a `LOGIN` is a
/// protocol error; a `LOGIN` whose handle is missing or contains
/// whitespace is an invalid username.
pub fn parse_login(line: &str) -> Result<Handle, ErrorCode> {
    let (keyword, rest) = split_command(line.trim());

    if !keyword.eq_ignore_ascii_case("LOGIN") {
        return Err(ErrorCode::InvalidProtocol);
    }

    Handle::parse(rest.trim()).map_err(|_| ErrorCode::InvalidUsername)
}

/// Commands accepted from an active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Broadcast to every active session, sender included.
    Msg { text: String },

    /// List active handles.
    Who,

    /// Deliver to one session.
    Dm { target: Handle, text: String },

    /// Liveness check.
    Ping,

    /// End the session.
    Logout,
}

impl Command {
    /// Parses one non-blank line.
    ///
    /// Message text is returned already normalized. Argument errors map to
    /// the error code the client should receive.
    pub fn parse(line: &str) -> Result<Self, ErrorCode> {
        let (token, rest) = split_command(line.trim());

        match token.to_ascii_uppercase().as_str() {
            "MSG" => {
                let text = normalize_text(rest);
                if text.is_empty() {
                    return Err(ErrorCode::EmptyMessage);
                }
                Ok(Self::Msg { text })
            }
            "WHO" => Ok(Self::Who),
            "DM" => {
                let (target, text) = split_command(rest);
                if target.is_empty() || text.is_empty() {
                    return Err(ErrorCode::DmInvalid);
                }
                let target = Handle::parse(target).map_err(|_| ErrorCode::DmInvalid)?;
                Ok(Self::Dm {
                    target,
                    text: normalize_text(text),
                })
            }
            "PING" => Ok(Self::Ping),
            "LOGOUT" => Ok(Self::Logout),
            _ => Err(ErrorCode::UnknownCommand),
        }
    }

    /// Command keyword, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Msg { .. } => "MSG",
            Self::Who => "WHO",
            Self::Dm { .. } => "DM",
            Self::Ping => "PING",
            Self::Logout => "LOGOUT",
        }
    }
}
