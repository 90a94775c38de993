//! One entry point for the host application.
//!
//! [`EncryptedSearch`] owns the indexing states, the persisted index, and the
//! cache, and keeps them consistent: per-message mutations go to the index
//! first and then to the live cache, storage pressure triggers eviction,
//! and running out of disk moves indexing into `lowstorage`.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::cache::{BuildReport, CacheBudget, CacheManager, CachedMessage};
use crate::config::Config;
use crate::crypto::{self, ContentCipher};
use crate::error::Result;
use crate::extract;
use crate::index::{IndexStore, WriteOutcome};
use crate::model::{DecryptedContent, MessageMetadata, UserId};
use crate::resources::DeviceResources;
use crate::search::{self, query::SearchQuery, SearchResults};
use crate::state::{IndexState, IndexStates};

/// Encrypted search for every user of the application.
pub struct EncryptedSearch {
    states: Arc<IndexStates>,
    store: Arc<IndexStore>,
    cache: CacheManager,
    resources: Arc<dyn DeviceResources>,
}

impl EncryptedSearch {
    pub fn new(
        dir: impl Into<PathBuf>,
        config: &Config,
        cipher: Arc<dyn ContentCipher>,
        resources: Arc<dyn DeviceResources>,
    ) -> Self {
        let states = Arc::new(IndexStates::new());
        let store = Arc::new(IndexStore::new(
            dir,
            config.index.clone(),
            states.clone(),
            cipher,
        ));
        let budget = CacheBudget::from_resources(resources.as_ref(), &config.cache);
        let cache = CacheManager::new(store.clone(), budget);
        Self {
            states,
            store,
            cache,
            resources,
        }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn state(&self, user: &UserId) -> IndexState {
        self.states.get(user)
    }

    /// Start indexing for `user` and make sure the index exists.
    pub fn enable(&self, user: &UserId) -> Result<()> {
        self.states.enable(user)?;
        self.store.ensure_schema(user)?;
        Ok(())
    }

    /// Move `user` to `next`. Returns the previous state.
    pub fn set_state(&self, user: &UserId, next: IndexState) -> Result<IndexState> {
        self.states.transition(user, next)
    }

    /// Stop indexing for `user` and delete everything kept for them.
    pub fn disable(&self, user: &UserId) -> Result<()> {
        self.cache.delete_all(user);
        self.store.delete_store(user)?;
        self.states.reset(user);
        info!(user = %user, "Encrypted search disabled");
        Ok(())
    }

    /// Add a message to the index, and to the cache when one is active.
    ///
    /// Before writing, free disk space and the configured storage limit are
    /// checked. Low disk space skips the write with
    /// [`WriteOutcome::LowStorage`] in any writable state, and moves a
    /// downloading user to `lowstorage`. Exceeding the storage limit evicts the oldest entries
    /// to make room and marks a downloading index `partial`.
    pub fn index_message(
        &self,
        user: &UserId,
        metadata: &MessageMetadata,
        content: Option<&DecryptedContent>,
    ) -> Result<WriteOutcome> {
        let state = self.states.get(user);
        if !state.is_writable() {
            return self.store.insert(user, metadata, content);
        }

        let free = self.resources.free_disk_space();
        if free < self.store.config().low_storage_limit {
            warn!(user = %user, free, "Low disk space, not indexing");
            self.fall_back(user, IndexState::LowStorage);
            return Ok(WriteOutcome::LowStorage);
        }

        let sealed = content
            .map(|c| crypto::encrypt_content(self.store.cipher(), c))
            .transpose()?;
        let incoming = sealed.as_ref().map_or(0, |s| s.size as u64);
        self.make_room(user, incoming)?;

        let outcome = match self.store.insert_encrypted(user, metadata, sealed.as_ref()) {
            Err(e) if e.is_storage_exhausted() => {
                warn!(user = %user, error = %e, "Disk full while indexing");
                self.fall_back(user, IndexState::LowStorage);
                return Err(e);
            }
            other => other?,
        };
        if let (WriteOutcome::Applied, Some(content)) = (outcome, content) {
            self.cache
                .update(user, CachedMessage::new(metadata.clone(), content.clone()));
        }
        Ok(outcome)
    }

    /// Index a raw decrypted RFC 5322 message.
    pub fn index_mime(
        &self,
        user: &UserId,
        metadata: &MessageMetadata,
        raw: &[u8],
    ) -> Result<WriteOutcome> {
        let content = extract::content_from_mime(raw);
        self.index_message(user, metadata, Some(&content))
    }

    /// Evict old entries when `incoming` more bytes would exceed the limit.
    fn make_room(&self, user: &UserId, incoming: u64) -> Result<()> {
        let config = self.store.config();
        let Some(limit) = config.storage_limit else {
            return Ok(());
        };
        let current = self.store.size(user)?;
        if current + incoming + config.storage_limit_margin <= limit {
            return Ok(());
        }
        let report = self
            .store
            .shrink(user, current.saturating_sub(incoming), None)?;
        if self.states.get(user).is_indexing() {
            self.fall_back(user, IndexState::Partial);
        }
        info!(
            user = %user,
            limit,
            evicted = report.rows_deleted,
            "Storage limit reached"
        );
        Ok(())
    }

    fn fall_back(&self, user: &UserId, next: IndexState) {
        let current = self.states.get(user);
        if current == next || !current.can_transition_to(next) {
            return;
        }
        if let Err(e) = self.states.transition(user, next) {
            warn!(user = %user, error = %e, "Could not change indexing state");
        }
    }

    /// Replace a message's content in the index and the cache.
    pub fn update_message(
        &self,
        user: &UserId,
        message_id: &str,
        content: &DecryptedContent,
    ) -> Result<WriteOutcome> {
        let outcome = self.store.update(user, message_id, content)?;
        if outcome.is_applied() {
            if let Some(entry) = self.store.get(user, message_id)? {
                self.cache
                    .update(user, CachedMessage::new(entry.metadata(), content.clone()));
            }
        }
        Ok(outcome)
    }

    /// Change a message's time, order, or labels in the index and the cache.
    pub fn update_metadata(&self, user: &UserId, metadata: &MessageMetadata) -> Result<WriteOutcome> {
        let outcome = self.store.update_metadata(user, metadata)?;
        if outcome.is_applied() {
            if let Some(cached) = self.cache.get(user, &metadata.message_id) {
                self.cache
                    .update(user, CachedMessage::new(metadata.clone(), cached.content));
            }
        }
        Ok(outcome)
    }

    /// Remove a message from both the index and the cache.
    pub fn remove_message(&self, user: &UserId, message_id: &str) -> Result<WriteOutcome> {
        let outcome = self.store.remove(user, message_id)?;
        if !matches!(outcome, WriteOutcome::Disallowed(_)) {
            self.cache.remove(user, message_id);
        }
        Ok(outcome)
    }

    /// Build `user`'s cache in the background with the configured batch size.
    pub fn build_cache(&self, user: &UserId) -> Result<JoinHandle<Result<BuildReport>>> {
        self.cache.build(user, self.cache.budget().batch_size)
    }

    /// Search `user`'s messages, newest first.
    pub fn search(
        &self,
        user: &UserId,
        query: &str,
        limit: Option<usize>,
        progress: Option<&dyn Fn(usize, usize) -> bool>,
    ) -> Result<(SearchQuery, SearchResults)> {
        search::execute(&self.store, &self.cache, user, query, limit, progress)
    }
}
