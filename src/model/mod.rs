//! Data model: users, index rows, and searchable content.

pub mod content;
pub mod entry;
pub mod recipient;
pub mod user;

pub use content::{DecryptedContent, EncryptedContent};
pub use entry::{MessageMetadata, SearchableEntry};
pub use recipient::Recipient;
pub use user::UserId;
