//! The persisted, per-user search index and its eviction.

pub mod eviction;
pub mod files;
pub mod query;
pub mod schema;
pub mod store;

pub use eviction::{ShrinkProgress, ShrinkReport};
pub use query::{Cursor, IndexQuery, TimeOrder};
pub use store::{IndexStore, WriteOutcome};
