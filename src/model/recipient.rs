//! Senders and recipients of indexed messages.

use std::fmt;

/// A message participant as kept in searchable content.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Recipient {
    /// Display name, possibly empty.
    pub name: String,
    /// Bare address (`user@domain`).
    pub email: String,
}

impl Recipient {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Bytes of text held by this recipient.
    pub fn heap_size(&self) -> usize {
        self.name.len() + self.email.len()
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.email)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}
