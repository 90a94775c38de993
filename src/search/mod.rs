//! Search over the active cache, falling back to the encrypted index.

pub mod matcher;
pub mod query;

use tracing::{debug, warn};

use crate::cache::{CacheManager, CachedMessage};
use crate::error::Result;
use crate::index::{Cursor, IndexQuery, IndexStore};
use crate::model::UserId;

use self::query::{parse_query, SearchQuery};

/// Rows decrypted per round trip when scanning the index.
const INDEX_BATCH: usize = 64;

/// Matches of one search, newest first.
#[derive(Debug, Default)]
pub struct SearchResults {
    pub hits: Vec<CachedMessage>,
    /// Messages examined in memory.
    pub scanned_cached: usize,
    /// Index rows decrypted and examined.
    pub scanned_index: usize,
    /// Index rows that could not be decoded.
    pub skipped: usize,
    pub cancelled: bool,
}

/// Parse `query_str` and collect up to `limit` matches for `user`.
///
/// The cache is searched first. Index rows older than the oldest cached
/// message (or every row, when no cache is active) are then decrypted one
/// at a time. The `progress` callback receives `(processed, total)` index
/// rows and returns `false` to cancel.
pub fn execute(
    store: &IndexStore,
    cache: &CacheManager,
    user: &UserId,
    query_str: &str,
    limit: Option<usize>,
    progress: Option<&dyn Fn(usize, usize) -> bool>,
) -> Result<(SearchQuery, SearchResults)> {
    let query = parse_query(query_str);
    let limit = limit.unwrap_or(usize::MAX);
    let mut results = SearchResults::default();

    // Phase 1: in memory
    let cached = cache.scan_newest_first(user, |message| {
        if matcher::matches(message, &query) {
            results.hits.push(message.clone());
        }
        results.hits.len() < limit
    });
    if let Some(visited) = cached {
        results.scanned_cached = visited;
    }
    if results.hits.len() >= limit {
        return Ok((query, results));
    }

    // Phase 2: whatever the cache does not cover
    let mut cursor: Option<Cursor> = cache.oldest_cursor(user);
    let total = store
        .content_complete_count(user)?
        .saturating_sub(cache.length(user).unwrap_or(0));
    let mut processed = 0;

    'scan: loop {
        let mut batch = IndexQuery::newest_first()
            .content_complete()
            .limit(INDEX_BATCH);
        if let Some(c) = cursor.take() {
            batch = batch.after(c);
        }
        let rows = store.query(user, &batch)?;
        let exhausted = rows.len() < INDEX_BATCH;
        cursor = rows.last().map(Cursor::from);

        for entry in rows {
            if let Some(cb) = progress {
                if !cb(processed, total) {
                    debug!(user = %user, processed, total, "Search cancelled");
                    results.cancelled = true;
                    break 'scan;
                }
            }
            processed += 1;
            if cache.contains(user, &entry.message_id) {
                continue;
            }
            let content = match store.decrypt_entry(&entry) {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(e) if e.is_decode() => {
                    warn!(user = %user, message_id = %entry.message_id, error = %e, "Skipping undecodable entry");
                    results.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            results.scanned_index += 1;
            let message = CachedMessage::new(entry.metadata(), content);
            if matcher::matches(&message, &query) {
                results.hits.push(message);
                if results.hits.len() >= limit {
                    break 'scan;
                }
            }
        }
        if exhausted {
            break;
        }
    }

    if let Some(cb) = progress {
        if !results.cancelled {
            let _ = cb(processed, total);
        }
    }
    Ok((query, results))
}
