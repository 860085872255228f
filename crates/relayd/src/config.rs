//! Server tunables.
//!
//! Everything the relay needs to know at startup lives in [`ServerConfig`].
//! The binary fills it from command-line flags and the environment; tests
//! build it directly with struct update syntax.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use relayd::config::ServerConfig;
//!
//! let config = ServerConfig {
//!     idle_timeout: Duration::from_secs(5),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use relay_protocol::DEFAULT_MAX_LINE_LENGTH;
use thiserror::Error;

/// Port used when neither the command line nor the environment names one.
pub const DEFAULT_PORT: u16 = 4000;

/// Environment variable consulted for the listening port.
pub const PORT_ENV_VAR: &str = "CHAT_PORT";

/// Inactivity threshold for logged-in sessions.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a single socket write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lines buffered per session before it counts as a slow consumer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Errors reported by [`ServerConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: IpAddr,

    /// Port to listen on. `0` picks an ephemeral port.
    pub port: u16,

    /// How long a session may stay silent before the reaper evicts it.
    pub idle_timeout: Duration,

    /// Period of the reaper sweep.
    pub reap_interval: Duration,

    /// How long a fresh connection may take to send `LOGIN`.
    pub login_timeout: Duration,

    /// Upper bound on one socket write.
    pub write_timeout: Duration,

    /// Outbound queue length per session.
    pub queue_capacity: usize,

    /// Longest accepted input line, in bytes, terminator excluded.
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            reap_interval: DEFAULT_IDLE_TIMEOUT,
            login_timeout: DEFAULT_IDLE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Checks that every duration and capacity is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("idle timeout", self.idle_timeout),
            ("reap interval", self.reap_interval),
            ("login timeout", self.login_timeout),
            ("write timeout", self.write_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("queue capacity"));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::ZeroCapacity("max line length"));
        }

        Ok(())
    }
}

/// Picks the listening port.
///
/// An explicit argument wins, then a parsable environment value, then
/// [`DEFAULT_PORT`]. An environment value that is not a port is returned as
/// the error half so the caller can report it.
pub fn resolve_port(arg: Option<u16>, env: Option<&str>) -> (u16, Option<String>) {
    if let Some(port) = arg {
        return (port, None);
    }

    match env.map(str::trim) {
        None | Some("") => (DEFAULT_PORT, None),
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => (port, None),
            Err(_) => (DEFAULT_PORT, Some(raw.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4000);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.reap_interval, config.idle_timeout);
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.socket_addr().port(), 4000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = ServerConfig {
            idle_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("idle timeout"))
        );

        let config = ServerConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroCapacity("queue capacity"))
        );
    }

    #[test]
    fn test_resolve_port_precedence() {
        assert_eq!(resolve_port(Some(5000), Some("6000")), (5000, None));
        assert_eq!(resolve_port(None, Some("6000")), (6000, None));
        assert_eq!(resolve_port(None, Some(" 6001 ")), (6001, None));
        assert_eq!(resolve_port(None, None), (DEFAULT_PORT, None));
        assert_eq!(resolve_port(None, Some("")), (DEFAULT_PORT, None));
    }

    #[test]
    fn test_resolve_port_bad_env() {
        assert_eq!(
            resolve_port(None, Some("chat")),
            (DEFAULT_PORT, Some("chat".to_string()))
        );
        assert_eq!(
            resolve_port(None, Some("70000")),
            (DEFAULT_PORT, Some("70000".to_string()))
        );
    }
}
