//! In-memory cache of decoded messages for the active user.
//!
//! At most one user's cache exists at a time. Building for another user
//! discards the current cache first. The cache is a derived copy of the
//! index: it lags behind store writes and can always be rebuilt, so every
//! query on it answers "no cache" (`None` / `false`) when the slot is empty
//! or belongs to someone else.
//!
//! Builds stream the index newest-first in keyset batches, decrypt outside
//! the slot lock, and re-check store membership while holding it, so a
//! message removed while its batch was being decrypted never reappears.
//! Lock order is slot first, then the store's per-user guard.
//!
//! A cache that is partial or still building holds a contiguous window of
//! the newest messages. Search resumes the index scan below the oldest
//! cached message, so nothing older than that window is ever admitted.

pub mod budget;
pub mod message;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{IndexError, Result};
use crate::index::{Cursor, IndexQuery, IndexStore};
use crate::model::UserId;

pub use budget::CacheBudget;
pub use message::CachedMessage;

/// Chronological key: `(time, order, message_id)`.
type TimeKey = (i64, i64, String);

/// Summary of one cache build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Messages added to the cache.
    pub loaded: usize,
    /// Rows skipped because they could not be decoded.
    pub skipped: usize,
    /// The memory budget stopped the build early.
    pub partial: bool,
    /// A complete cache for this user already existed.
    pub already_built: bool,
    /// Another build or a delete took over the slot.
    pub superseded: bool,
}

struct ActiveCache {
    user: UserId,
    generation: u64,
    messages: HashMap<String, CachedMessage>,
    by_time: BTreeSet<TimeKey>,
    size_bytes: u64,
    built: bool,
    partial: bool,
}

impl ActiveCache {
    fn new(user: UserId, generation: u64) -> Self {
        Self {
            user,
            generation,
            messages: HashMap::new(),
            by_time: BTreeSet::new(),
            size_bytes: 0,
            built: false,
            partial: false,
        }
    }

    fn insert(&mut self, message: CachedMessage) {
        self.remove(&message.message_id);
        self.size_bytes += message.heap_size();
        self.by_time
            .insert((message.time, message.order, message.message_id.clone()));
        self.messages.insert(message.message_id.clone(), message);
    }

    fn remove(&mut self, message_id: &str) -> Option<CachedMessage> {
        let old = self.messages.remove(message_id)?;
        self.by_time
            .remove(&(old.time, old.order, old.message_id.clone()));
        self.size_bytes = self.size_bytes.saturating_sub(old.heap_size());
        Some(old)
    }

    fn oldest(&self) -> Option<&TimeKey> {
        self.by_time.first()
    }

    fn evict_oldest(&mut self) -> Option<CachedMessage> {
        let (_, _, id) = self.by_time.first()?.clone();
        self.remove(&id)
    }

    /// Whether `key` falls outside the newest-first window this cache covers.
    fn below_window(&self, key: &TimeKey) -> bool {
        if self.built && !self.partial {
            return false;
        }
        self.oldest().is_none_or(|oldest| key < oldest)
    }
}

struct Inner {
    store: Arc<IndexStore>,
    budget: CacheBudget,
    slot: RwLock<Option<ActiveCache>>,
    /// Bumped whenever the slot is replaced or dropped; running builds
    /// compare against it and stop when it moves.
    generation: AtomicU64,
}

/// Owner of the single active cache.
///
/// Cheap to clone; clones share the same slot.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl CacheManager {
    pub fn new(store: Arc<IndexStore>, budget: CacheBudget) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                budget,
                slot: RwLock::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn budget(&self) -> CacheBudget {
        self.inner.budget
    }

    /// User whose cache is currently held, if any.
    pub fn active_user(&self) -> Option<UserId> {
        self.inner.slot.read().as_ref().map(|c| c.user.clone())
    }

    /// Run `f` on the cache if it belongs to `user`.
    fn with_cache<T>(&self, user: &UserId, f: impl FnOnce(&ActiveCache) -> T) -> Option<T> {
        let slot = self.inner.slot.read();
        slot.as_ref().filter(|c| c.user == *user).map(f)
    }

    fn with_cache_mut<T>(&self, user: &UserId, f: impl FnOnce(&mut ActiveCache) -> T) -> Option<T> {
        let mut slot = self.inner.slot.write();
        slot.as_mut().filter(|c| c.user == *user).map(f)
    }

    // ── Build ───────────────────────────────────────────────────

    /// Build `user`'s cache on a background thread.
    pub fn build(&self, user: &UserId, batch_size: usize) -> Result<JoinHandle<Result<BuildReport>>> {
        let manager = self.clone();
        let user = user.clone();
        std::thread::Builder::new()
            .name("esindex-cache".into())
            .spawn(move || manager.build_blocking(&user, batch_size))
            .map_err(|e| IndexError::io(self.inner.store.dir(), e))
    }

    /// Build `user`'s cache on the calling thread.
    ///
    /// Returns early when a complete cache for `user` exists or when the
    /// index holds no content-complete row yet.
    pub fn build_blocking(&self, user: &UserId, batch_size: usize) -> Result<BuildReport> {
        if self.is_built(user) {
            return Ok(BuildReport {
                already_built: true,
                ..BuildReport::default()
            });
        }
        if self.inner.store.content_complete_count(user)? == 0 {
            debug!(user = %user, "Nothing to cache yet");
            return Ok(BuildReport::default());
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut slot = self.inner.slot.write();
            if let Some(previous) = slot.as_ref() {
                if previous.user != *user {
                    info!(user = %previous.user, "Dropping cache of previous user");
                }
            }
            *slot = Some(ActiveCache::new(user.clone(), generation));
        }

        let result = self.fill(user, generation, batch_size.max(1));
        if result.is_err() {
            let mut slot = self.inner.slot.write();
            if slot.as_ref().is_some_and(|c| c.generation == generation) {
                *slot = None;
            }
        }
        result
    }

    fn fill(&self, user: &UserId, generation: u64, batch_size: usize) -> Result<BuildReport> {
        let store = &self.inner.store;
        let mut report = BuildReport::default();
        let mut cursor: Option<Cursor> = None;

        'batches: loop {
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                report.superseded = true;
                return Ok(report);
            }

            let mut query = IndexQuery::newest_first()
                .content_complete()
                .limit(batch_size);
            if let Some(c) = cursor.take() {
                query = query.after(c);
            }
            let rows = store.query(user, &query)?;
            let exhausted = rows.len() < batch_size;
            cursor = rows.last().map(Cursor::from);

            let mut decoded = Vec::with_capacity(rows.len());
            for entry in &rows {
                match store.decrypt_entry(entry) {
                    Ok(Some(content)) => decoded.push(CachedMessage::new(entry.metadata(), content)),
                    Ok(None) => {}
                    Err(e) if e.is_decode() => {
                        warn!(user = %user, message_id = %entry.message_id, error = %e, "Skipping undecodable entry");
                        report.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            let mut slot = self.inner.slot.write();
            let Some(cache) = slot.as_mut().filter(|c| c.generation == generation) else {
                report.superseded = true;
                return Ok(report);
            };
            let live = store.retain_existing(user, decoded.iter().map(|m| m.message_id.as_str()))?;
            for message in decoded {
                if !live.contains(&message.message_id) || cache.messages.contains_key(&message.message_id) {
                    continue;
                }
                if cache.size_bytes + message.heap_size() > self.inner.budget.max_bytes {
                    cache.partial = true;
                    report.partial = true;
                    cache.built = true;
                    break 'batches;
                }
                cache.insert(message);
                report.loaded += 1;
            }
            if exhausted {
                cache.built = true;
                break;
            }
        }

        info!(
            user = %user,
            loaded = report.loaded,
            skipped = report.skipped,
            partial = report.partial,
            "Search cache built"
        );
        Ok(report)
    }

    // ── Mutation ────────────────────────────────────────────────

    /// Insert or replace a message in `user`'s cache.
    ///
    /// Older messages are evicted while the cache is over budget, which
    /// marks it partial. A partial or unfinished cache does not admit a
    /// message older than its oldest entry; any stale copy is dropped and
    /// the message stays reachable through the index.
    ///
    /// Returns whether the message is cached afterwards.
    pub fn update(&self, user: &UserId, message: CachedMessage) -> bool {
        let max_bytes = self.inner.budget.max_bytes;
        self.with_cache_mut(user, |cache| {
            let key = (message.time, message.order, message.message_id.clone());
            if cache.below_window(&key) {
                cache.remove(&key.2);
                debug!(user = %user, message_id = %key.2, "Message older than cached window");
                return false;
            }
            cache.insert(message);
            while cache.size_bytes > max_bytes && cache.messages.len() > 1 {
                if let Some(evicted) = cache.evict_oldest() {
                    debug!(user = %user, message_id = %evicted.message_id, "Evicted cached message");
                }
                cache.partial = true;
            }
            cache.messages.contains_key(&key.2)
        })
        .unwrap_or(false)
    }

    /// Drop a message from `user`'s cache. Returns whether it was cached.
    pub fn remove(&self, user: &UserId, message_id: &str) -> bool {
        self.with_cache_mut(user, |cache| cache.remove(message_id).is_some())
            .unwrap_or(false)
    }

    /// Discard `user`'s cache and stop any build running for it.
    ///
    /// Returns whether a cache was dropped.
    pub fn delete_all(&self, user: &UserId) -> bool {
        let mut slot = self.inner.slot.write();
        if slot.as_ref().is_some_and(|c| c.user == *user) {
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            *slot = None;
            info!(user = %user, "Search cache deleted");
            true
        } else {
            false
        }
    }

    /// Discard whatever cache is active.
    pub fn clear(&self) {
        let mut slot = self.inner.slot.write();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *slot = None;
    }

    // ── Queries (memory only) ───────────────────────────────────

    pub fn contains(&self, user: &UserId, message_id: &str) -> bool {
        self.with_cache(user, |c| c.messages.contains_key(message_id))
            .unwrap_or(false)
    }

    pub fn get(&self, user: &UserId, message_id: &str) -> Option<CachedMessage> {
        self.with_cache(user, |c| c.messages.get(message_id).cloned())
            .flatten()
    }

    pub fn length(&self, user: &UserId) -> Option<usize> {
        self.with_cache(user, |c| c.messages.len())
    }

    pub fn size_bytes(&self, user: &UserId) -> Option<u64> {
        self.with_cache(user, |c| c.size_bytes)
    }

    pub fn oldest_time(&self, user: &UserId) -> Option<i64> {
        self.with_cache(user, |c| c.oldest().map(|k| k.0)).flatten()
    }

    pub fn oldest_id(&self, user: &UserId) -> Option<String> {
        self.with_cache(user, |c| c.oldest().map(|k| k.2.clone()))
            .flatten()
    }

    /// Position of the oldest cached message.
    pub fn oldest_cursor(&self, user: &UserId) -> Option<Cursor> {
        self.with_cache(user, |c| c.oldest().map(|(t, o, id)| Cursor::new(*t, *o, id.clone())))
            .flatten()
    }

    pub fn is_built(&self, user: &UserId) -> bool {
        self.with_cache(user, |c| c.built).unwrap_or(false)
    }

    pub fn is_partial(&self, user: &UserId) -> bool {
        self.with_cache(user, |c| c.partial).unwrap_or(false)
    }

    /// Visit `user`'s cached messages newest first while `f` returns `true`.
    ///
    /// Returns the number visited, or `None` when no cache is active. The
    /// cache is read-locked for the duration, so `f` must not call back into
    /// this manager's mutating methods.
    pub fn scan_newest_first(
        &self,
        user: &UserId,
        mut f: impl FnMut(&CachedMessage) -> bool,
    ) -> Option<usize> {
        self.with_cache(user, |cache| {
            let mut visited = 0;
            for (_, _, id) in cache.by_time.iter().rev() {
                let Some(message) = cache.messages.get(id) else {
                    continue;
                };
                visited += 1;
                if !f(message) {
                    break;
                }
            }
            visited
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::crypto::testing::XorCipher;
    use crate::crypto::{ContentCipher, Sealed};
    use crate::model::{DecryptedContent, MessageMetadata};
    use crate::state::IndexStates;

    /// Runs a one-shot hook on the first decryption, while a build is
    /// between reading a batch and inserting it.
    #[derive(Default)]
    struct HookedCipher {
        inner: XorCipher,
        hook: parking_lot::Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl HookedCipher {
        fn on_first_open(&self, hook: impl FnOnce() + Send + 'static) {
            *self.hook.lock() = Some(Box::new(hook));
        }
    }

    impl ContentCipher for HookedCipher {
        fn seal(&self, plaintext: &[u8]) -> Result<Sealed> {
            self.inner.seal(plaintext)
        }

        fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
            let hook = self.hook.lock().take();
            if let Some(hook) = hook {
                hook();
            }
            self.inner.open(nonce, ciphertext)
        }
    }

    fn hooked_setup(dir: &std::path::Path) -> (Arc<HookedCipher>, Arc<IndexStore>, CacheManager) {
        let cipher = Arc::new(HookedCipher::default());
        let store = Arc::new(IndexStore::new(
            dir,
            IndexConfig::default(),
            Arc::new(IndexStates::new()),
            cipher.clone(),
        ));
        let cache = CacheManager::new(store.clone(), CacheBudget::new(u64::MAX, 2));
        (cipher, store, cache)
    }

    fn setup(dir: &std::path::Path, max_bytes: u64) -> (Arc<IndexStore>, CacheManager) {
        let store = Arc::new(IndexStore::new(
            dir,
            IndexConfig::default(),
            Arc::new(IndexStates::new()),
            Arc::new(XorCipher::default()),
        ));
        let cache = CacheManager::new(store.clone(), CacheBudget::new(max_bytes, 2));
        (store, cache)
    }

    fn add(store: &IndexStore, user: &UserId, id: &str, time: i64) {
        let content = DecryptedContent {
            subject: format!("subject {id}"),
            body: "body".repeat(50),
            ..Default::default()
        };
        store
            .insert(user, &MessageMetadata::new(id, time, 0), Some(&content))
            .unwrap();
    }

    fn message(id: &str, time: i64, body: &str) -> CachedMessage {
        CachedMessage::new(
            MessageMetadata::new(id, time, 0),
            DecryptedContent {
                body: body.into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_no_cache_answers_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, cache) = setup(tmp.path(), u64::MAX);
        let user = UserId::from("u1");
        assert!(!cache.contains(&user, "m1"));
        assert_eq!(cache.length(&user), None);
        assert_eq!(cache.oldest_time(&user), None);
        assert!(!cache.is_built(&user));
        assert!(!cache.update(&user, message("m1", 1, "x")));
        assert!(!cache.remove(&user, "m1"));
    }

    #[test]
    fn test_build_skipped_without_content() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, cache) = setup(tmp.path(), u64::MAX);
        let user = UserId::from("u1");
        store.states().enable(&user).unwrap();
        store
            .insert(&user, &MessageMetadata::new("m1", 1, 1), None)
            .unwrap();

        let report = cache.build_blocking(&user, 2).unwrap();
        assert_eq!(report, BuildReport::default());
        assert_eq!(cache.active_user(), None);
    }

    #[test]
    fn test_build_in_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, cache) = setup(tmp.path(), u64::MAX);
        let user = UserId::from("u1");
        store.states().enable(&user).unwrap();
        for (i, id) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            add(&store, &user, id, (i as i64 + 1) * 10);
        }

        let report = cache.build_blocking(&user, 2).unwrap();
        assert_eq!(report.loaded, 5);
        assert!(!report.partial);
        assert!(cache.is_built(&user));
        assert_eq!(cache.length(&user), Some(5));
        assert_eq!(cache.oldest_id(&user).as_deref(), Some("a"));
        assert_eq!(cache.oldest_time(&user), Some(10));

        let again = cache.build_blocking(&user, 2).unwrap();
        assert!(again.already_built);
    }

    #[test]
    fn test_budget_makes_cache_partial_with_newest() {
        let tmp = tempfile::tempdir().unwrap();
        let user = UserId::from("u1");
        let probe = {
            let (store, cache) = setup(tmp.path(), u64::MAX);
            store.states().enable(&user).unwrap();
            for (i, id) in ["a", "b", "c", "d", "e"].iter().enumerate() {
                add(&store, &user, id, (i as i64 + 1) * 10);
            }
            cache.build_blocking(&user, 2).unwrap();
            cache.get(&user, "e").unwrap().heap_size()
        };

        // Room for a little over two messages.
        let store = Arc::new(IndexStore::new(
            tmp.path(),
            IndexConfig::default(),
            Arc::new(IndexStates::new()),
            Arc::new(XorCipher::default()),
        ));
        let cache = CacheManager::new(store, CacheBudget::new(probe * 2 + probe / 2, 2));
        let report = cache.build_blocking(&user, 2).unwrap();
        assert!(report.partial);
        assert!(cache.is_partial(&user));
        assert_eq!(cache.length(&user), Some(2));
        assert!(cache.contains(&user, "e"));
        assert!(cache.contains(&user, "d"));
        assert!(!cache.contains(&user, "a"));
    }

    #[test]
    fn test_switching_user_replaces_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, cache) = setup(tmp.path(), u64::MAX);
        let a = UserId::from("a");
        let b = UserId::from("b");
        for user in [&a, &b] {
            store.states().enable(user).unwrap();
        }
        add(&store, &a, "a1", 1);
        add(&store, &b, "b1", 1);

        cache.build_blocking(&a, 2).unwrap();
        assert_eq!(cache.active_user(), Some(a.clone()));
        cache.build_blocking(&b, 2).unwrap();
        assert_eq!(cache.active_user(), Some(b.clone()));
        assert!(!cache.contains(&a, "a1"));
        assert_eq!(cache.length(&a), None);
        assert!(cache.contains(&b, "b1"));
    }

    #[test]
    fn test_update_evicts_oldest_over_budget() {
        let tmp = tempfile::tempdir().unwrap();
        let user = UserId::from("u1");
        let unit = message("m0", 0, &"x".repeat(100)).heap_size();
        let (store, cache) = setup(tmp.path(), unit * 2);
        store.states().enable(&user).unwrap();
        add(&store, &user, "seed", 0);
        cache.build_blocking(&user, 2).unwrap();
        cache.remove(&user, "seed");

        assert!(cache.update(&user, message("m1", 10, &"x".repeat(100))));
        assert!(cache.update(&user, message("m2", 20, &"x".repeat(100))));
        assert!(!cache.is_partial(&user));
        assert!(cache.update(&user, message("m3", 30, &"x".repeat(100))));
        assert!(cache.is_partial(&user));
        assert!(!cache.contains(&user, "m1"));
        assert_eq!(cache.length(&user), Some(2));
        assert!(cache.size_bytes(&user).unwrap() <= unit * 2);
    }

    #[test]
    fn test_delete_all_only_for_active_user() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, cache) = setup(tmp.path(), u64::MAX);
        let user = UserId::from("u1");
        store.states().enable(&user).unwrap();
        add(&store, &user, "m1", 1);
        cache.build_blocking(&user, 2).unwrap();

        assert!(!cache.delete_all(&UserId::from("other")));
        assert!(cache.delete_all(&user));
        assert_eq!(cache.active_user(), None);
        assert!(!cache.contains(&user, "m1"));
    }

    #[test]
    fn test_background_build() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, cache) = setup(tmp.path(), u64::MAX);
        let user = UserId::from("u1");
        store.states().enable(&user).unwrap();
        add(&store, &user, "m1", 1);

        let report = cache.build(&user, 10).unwrap().join().unwrap().unwrap();
        assert_eq!(report.loaded, 1);
        assert!(cache.is_built(&user));
    }

    #[test]
    fn test_scan_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, cache) = setup(tmp.path(), u64::MAX);
        let user = UserId::from("u1");
        store.states().enable(&user).unwrap();
        for (id, time) in [("a", 1), ("c", 3), ("b", 2)] {
            add(&store, &user, id, time);
        }
        cache.build_blocking(&user, 10).unwrap();

        let mut seen = Vec::new();
        let visited = cache.scan_newest_first(&user, |m| {
            seen.push(m.message_id.clone());
            seen.len() < 2
        });
        assert_eq!(visited, Some(2));
        assert_eq!(seen, ["c", "b"]);
    }

    #[test]
    fn test_delete_during_build_supersedes_it() {
        let tmp = tempfile::tempdir().unwrap();
        let (cipher, store, cache) = hooked_setup(tmp.path());
        let user = UserId::from("u1");
        store.states().enable(&user).unwrap();
        for (id, time) in [("m1", 10), ("m2", 20), ("m3", 30), ("m4", 40)] {
            add(&store, &user, id, time);
        }
        let (hook_cache, hook_user) = (cache.clone(), user.clone());
        cipher.on_first_open(move || {
            hook_cache.delete_all(&hook_user);
        });

        let report = cache.build_blocking(&user, 2).unwrap();
        assert!(report.superseded);
        assert_eq!(report.loaded, 0);
        assert_eq!(cache.active_user(), None);
        assert_eq!(cache.length(&user), None);
    }

    #[test]
    fn test_build_for_other_user_supersedes_running_build() {
        let tmp = tempfile::tempdir().unwrap();
        let (cipher, store, cache) = hooked_setup(tmp.path());
        let a = UserId::from("a");
        let b = UserId::from("b");
        for user in [&a, &b] {
            store.states().enable(user).unwrap();
        }
        add(&store, &a, "a1", 10);
        add(&store, &a, "a2", 20);
        add(&store, &b, "b1", 10);
        let (hook_cache, hook_user) = (cache.clone(), b.clone());
        cipher.on_first_open(move || {
            let report = hook_cache.build_blocking(&hook_user, 2).unwrap();
            assert_eq!(report.loaded, 1);
        });

        let report = cache.build_blocking(&a, 2).unwrap();
        assert!(report.superseded);
        assert_eq!(cache.active_user(), Some(b.clone()));
        assert!(cache.contains(&b, "b1"));
        assert_eq!(cache.length(&a), None);
    }

    #[test]
    fn test_row_removed_mid_batch_is_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let (cipher, store, cache) = hooked_setup(tmp.path());
        let user = UserId::from("u1");
        store.states().enable(&user).unwrap();
        for (id, time) in [("m1", 10), ("m2", 20), ("m3", 30), ("m4", 40)] {
            add(&store, &user, id, time);
        }
        // The first batch is [m4, m3]; m3 goes away while m4 is decrypted.
        let (hook_store, hook_user) = (store.clone(), user.clone());
        cipher.on_first_open(move || {
            hook_store.remove(&hook_user, "m3").unwrap();
        });

        let report = cache.build_blocking(&user, 2).unwrap();
        assert_eq!(report.loaded, 3);
        assert!(!report.superseded);
        assert!(cache.is_built(&user));
        assert!(!cache.contains(&user, "m3"));
        for id in ["m1", "m2", "m4"] {
            assert!(cache.contains(&user, id), "{id} should be cached");
        }
    }

    #[test]
    fn test_partial_cache_rejects_messages_below_window() {
        let tmp = tempfile::tempdir().unwrap();
        let user = UserId::from("u1");
        let unit = message("m0", 0, &"x".repeat(100)).heap_size();
        let (store, cache) = setup(tmp.path(), unit * 2);
        store.states().enable(&user).unwrap();
        add(&store, &user, "seed", 0);
        cache.build_blocking(&user, 2).unwrap();
        cache.remove(&user, "seed");

        for (id, time) in [("m1", 10), ("m2", 20), ("m3", 30)] {
            cache.update(&user, message(id, time, &"x".repeat(100)));
        }
        assert!(cache.is_partial(&user));
        assert_eq!(cache.oldest_id(&user).as_deref(), Some("m2"));

        assert!(!cache.update(&user, message("m9", 5, &"x".repeat(10))));
        assert!(!cache.contains(&user, "m9"));
        assert_eq!(cache.oldest_id(&user).as_deref(), Some("m2"));

        // A cached message moved below the window leaves the cache.
        assert!(!cache.update(&user, message("m3", 1, &"x".repeat(100))));
        assert!(!cache.contains(&user, "m3"));
        assert_eq!(cache.length(&user), Some(1));

        assert!(cache.update(&user, message("m4", 40, &"x".repeat(10))));
        assert_eq!(cache.oldest_id(&user).as_deref(), Some("m2"));
    }
}
