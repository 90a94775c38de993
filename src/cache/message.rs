//! Decoded messages held by the cache.

use std::collections::BTreeSet;

use crate::index::Cursor;
use crate::model::{DecryptedContent, MessageMetadata};

/// A search-ready message: identity fields plus decrypted content.
///
/// Only ever lives in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMessage {
    pub message_id: String,
    pub time: i64,
    pub order: i64,
    pub label_ids: BTreeSet<String>,
    pub content: DecryptedContent,
}

impl CachedMessage {
    pub fn new(metadata: MessageMetadata, content: DecryptedContent) -> Self {
        Self {
            message_id: metadata.message_id,
            time: metadata.time,
            order: metadata.order,
            label_ids: metadata.label_ids,
            content,
        }
    }

    /// Approximate heap bytes, counted against the cache budget.
    pub fn heap_size(&self) -> u64 {
        let labels: usize = self.label_ids.iter().map(|l| l.len()).sum();
        (std::mem::size_of::<Self>() + self.message_id.len() + labels + self.content.heap_size())
            as u64
    }

    /// Chronological position, matching the index's scan order.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.time, self.order, self.message_id.clone())
    }
}
