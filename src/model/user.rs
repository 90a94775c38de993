//! Stable per-user identifier.

use std::fmt;

/// Identifies whose search index an operation targets.
///
/// Every persisted file and every cache is keyed by this value, so it must
/// be the account's stable identifier, not a display name or email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier can be used verbatim inside a file name.
    pub fn is_filename_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_safe() {
        assert!(UserId::from("user_01-A").is_filename_safe());
        assert!(!UserId::from("a/b").is_filename_safe());
        assert!(!UserId::from("abc==").is_filename_safe());
        assert!(!UserId::from("").is_filename_safe());
    }
}
