//! The handle a client claims at login.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::HandleError;

/// Unique name bound to an active session.
///
/// A handle is non-empty and contains no whitespace. Comparison is
/// case-sensitive: `alice` and `Alice` are different handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    /// Validates and wraps a handle.
    ///
    /// The input is taken as-is; callers trim surrounding whitespace
    /// before validation when the wire format allows it.
    pub fn parse(raw: &str) -> Result<Self, HandleError> {
        if raw.is_empty() {
            return Err(HandleError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(HandleError::ContainsWhitespace(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Handle {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Handle {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_handle() {
        let handle = Handle::parse("alice").unwrap();
        assert_eq!(handle.as_str(), "alice");
        assert_eq!(handle.to_string(), "alice");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(Handle::parse(""), Err(HandleError::Empty));
    }

    #[test]
    fn test_parse_rejects_any_whitespace() {
        for raw in ["a b", "a\tb", "tab\t", "\u{00a0}x"] {
            assert!(
                matches!(Handle::parse(raw), Err(HandleError::ContainsWhitespace(_))),
                "expected whitespace rejection for {raw:?}"
            );
        }
    }

    #[test]
    fn test_handles_are_case_sensitive() {
        let lower: Handle = "bob".parse().unwrap();
        let upper: Handle = "Bob".parse().unwrap();
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_handle_borrows_as_str_for_map_lookups() {
        let mut map = std::collections::HashMap::new();
        map.insert(Handle::parse("carol").unwrap(), 1);
        assert_eq!(map.get("carol"), Some(&1));
    }
}
