//! `esindex`: an encrypted, on-device search index with a bounded cache.
//!
//! Searchable message content is sealed with a host-provided cipher and
//! stored in one SQLite file per user ([`index`]). The oldest entries are
//! evicted when the index outgrows its storage budget. A memory-bounded
//! cache of decoded messages ([`cache`]) serves searches for the active
//! user, and a per-user state machine ([`state`]) decides when the index
//! may be written. [`service::EncryptedSearch`] ties these together.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod index;
pub mod model;
pub mod resources;
pub mod search;
pub mod service;
pub mod state;

pub use error::{IndexError, Result};
pub use service::EncryptedSearch;
