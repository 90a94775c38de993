//! The per-user persisted search index.
//!
//! Each user gets one SQLite file plus a directory of side files for large
//! ciphertexts. Every read and write of a user's index goes through that
//! user's [`UserIndex`] guard, so store-level operations are linearized even
//! when the cache builder, the indexer, and eviction run on different
//! threads.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::crypto::{self, ContentCipher};
use crate::error::{IndexError, Result};
use crate::model::entry::{encode_labels, format_entry_date};
use crate::model::{DecryptedContent, EncryptedContent, MessageMetadata, SearchableEntry, UserId};
use crate::state::{IndexState, IndexStates};

use super::files;
use super::query::IndexQuery;
use super::schema::{self, CONTENT_COMPLETE, ORDER_ASC, TABLE};

/// Result of a write that may legitimately not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The row was written.
    Applied,
    /// No row (or no index) exists for the message.
    NotFound,
    /// An insert found the message already indexed.
    AlreadyIndexed,
    /// Writes are not allowed in the user's current state.
    Disallowed(IndexState),
    /// Free disk space is under the configured floor; nothing was written.
    LowStorage,
}

impl WriteOutcome {
    pub fn is_applied(self) -> bool {
        self == WriteOutcome::Applied
    }
}

/// Access guard for one user's backing store.
pub(crate) struct UserIndex {
    pub(crate) db_path: PathBuf,
    pub(crate) content_dir: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl UserIndex {
    fn db(&self, source: rusqlite::Error) -> IndexError {
        IndexError::database(&self.db_path, source)
    }
}

/// Persisted search indexes for every user of the application.
pub struct IndexStore {
    dir: PathBuf,
    config: IndexConfig,
    states: Arc<IndexStates>,
    cipher: Arc<dyn ContentCipher>,
    handles: Mutex<HashMap<UserId, Arc<UserIndex>>>,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IndexStore {
    /// Create a store rooted at `dir`. Nothing is touched on disk until the
    /// first write.
    pub fn new(
        dir: impl Into<PathBuf>,
        config: IndexConfig,
        states: Arc<IndexStates>,
        cipher: Arc<dyn ContentCipher>,
    ) -> Self {
        Self {
            dir: dir.into(),
            config,
            states,
            cipher,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn states(&self) -> &Arc<IndexStates> {
        &self.states
    }

    pub fn cipher(&self) -> &dyn ContentCipher {
        self.cipher.as_ref()
    }

    /// Path of `user`'s database file.
    pub fn index_path(&self, user: &UserId) -> PathBuf {
        files::index_path_for(&self.dir, user)
    }

    fn handle(&self, user: &UserId) -> Arc<UserIndex> {
        let mut handles = self.handles.lock();
        handles
            .entry(user.clone())
            .or_insert_with(|| {
                Arc::new(UserIndex {
                    db_path: files::index_path_for(&self.dir, user),
                    content_dir: files::content_dir_for(&self.dir, user),
                    conn: Mutex::new(None),
                })
            })
            .clone()
    }

    fn open_connection(&self, index: &UserIndex) -> Result<Connection> {
        std::fs::create_dir_all(&self.dir).map_err(|e| IndexError::io(&self.dir, e))?;
        let conn = Connection::open(&index.db_path).map_err(|e| index.db(e))?;
        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))
            .map_err(|e| index.db(e))?;
        schema::initialize(&conn).map_err(|e| index.db(e))?;
        Ok(conn)
    }

    /// Run `f` while holding `user`'s guard.
    ///
    /// Returns `None` without calling `f` when the index does not exist and
    /// `create` is false.
    pub(crate) fn with_connection<T>(
        &self,
        user: &UserId,
        create: bool,
        f: impl FnOnce(&UserIndex, &Connection) -> Result<T>,
    ) -> Result<Option<T>> {
        let index = self.handle(user);
        let mut slot = index.conn.lock();

        // The file may have been removed behind an open connection.
        if slot.is_some() && !index.db_path.exists() {
            *slot = None;
        }
        if slot.is_none() {
            if !create && !index.db_path.exists() {
                return Ok(None);
            }
            let existed = index.db_path.exists();
            *slot = Some(self.open_connection(&index)?);
            if !existed {
                info!(user = %user, path = %index.db_path.display(), "Created search index");
            }
        }
        let Some(conn) = slot.as_ref() else {
            return Ok(None);
        };
        f(index.as_ref(), conn).map(Some)
    }

    fn check_writable(&self, user: &UserId, message_id: &str, action: &str) -> Option<IndexState> {
        let state = self.states.get(user);
        if state.is_writable() {
            None
        } else {
            warn!(user = %user, message_id, state = %state, action, "Index write rejected");
            Some(state)
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Create `user`'s index file and table if missing.
    ///
    /// Returns `true` when the index was created by this call.
    pub fn ensure_schema(&self, user: &UserId) -> Result<bool> {
        let existed = self.exists(user);
        self.with_connection(user, true, |_, _| Ok(()))?;
        Ok(!existed)
    }

    /// Whether `user` has an index file.
    pub fn exists(&self, user: &UserId) -> bool {
        self.index_path(user).exists()
    }

    // ── Writes ──────────────────────────────────────────────────

    /// Index a message, sealing `content` first.
    ///
    /// With `content == None` a metadata-only row is written; content can be
    /// backfilled later with [`update`](Self::update).
    pub fn insert(
        &self,
        user: &UserId,
        metadata: &MessageMetadata,
        content: Option<&DecryptedContent>,
    ) -> Result<WriteOutcome> {
        if let Some(state) = self.check_writable(user, &metadata.message_id, "insert") {
            return Ok(WriteOutcome::Disallowed(state));
        }
        let sealed = content
            .map(|c| crypto::encrypt_content(self.cipher(), c))
            .transpose()?;
        self.insert_sealed(user, metadata, sealed.as_ref())
    }

    /// Index a message whose content is already sealed.
    pub fn insert_encrypted(
        &self,
        user: &UserId,
        metadata: &MessageMetadata,
        content: Option<&EncryptedContent>,
    ) -> Result<WriteOutcome> {
        if let Some(state) = self.check_writable(user, &metadata.message_id, "insert") {
            return Ok(WriteOutcome::Disallowed(state));
        }
        self.insert_sealed(user, metadata, content)
    }

    fn insert_sealed(
        &self,
        user: &UserId,
        metadata: &MessageMetadata,
        content: Option<&EncryptedContent>,
    ) -> Result<WriteOutcome> {
        let id = metadata.message_id.as_str();
        let outcome = self.with_connection(user, true, |index, conn| {
            if row_exists(conn, id).map_err(|e| index.db(e))? {
                debug!(user = %user, message_id = id, "Message already indexed");
                return Ok(WriteOutcome::AlreadyIndexed);
            }
            let placed = self.place_content(index, id, content)?;
            let result = conn.execute(
                "INSERT INTO SearchableMessage \
                 (ID, Time, MessageOrder, LabelIDs, EncryptionIV, EncryptedContent, EncryptedContentFile, Size) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    metadata.time,
                    metadata.order,
                    encode_labels(&metadata.label_ids),
                    content.map(|c| c.iv.as_str()),
                    placed.inline,
                    placed.file_column(),
                    content.map_or(-1, |c| c.size as i64),
                ],
            );
            match result {
                Ok(_) => Ok(WriteOutcome::Applied),
                Err(e) => {
                    if let Some(ref file) = placed.file {
                        remove_side_file(file);
                    }
                    if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
                        Ok(WriteOutcome::AlreadyIndexed)
                    } else {
                        Err(index.db(e))
                    }
                }
            }
        })?;
        Ok(outcome.unwrap_or(WriteOutcome::NotFound))
    }

    /// Replace the content of an indexed message, sealing it first.
    pub fn update(
        &self,
        user: &UserId,
        message_id: &str,
        content: &DecryptedContent,
    ) -> Result<WriteOutcome> {
        if let Some(state) = self.check_writable(user, message_id, "update") {
            return Ok(WriteOutcome::Disallowed(state));
        }
        let sealed = crypto::encrypt_content(self.cipher(), content)?;
        self.update_sealed(user, message_id, &sealed)
    }

    /// Replace the content of an indexed message with already sealed content.
    ///
    /// Only the content columns change. A missing row is reported as
    /// [`WriteOutcome::NotFound`] and not retried.
    pub fn update_encrypted(
        &self,
        user: &UserId,
        message_id: &str,
        content: &EncryptedContent,
    ) -> Result<WriteOutcome> {
        if let Some(state) = self.check_writable(user, message_id, "update") {
            return Ok(WriteOutcome::Disallowed(state));
        }
        self.update_sealed(user, message_id, content)
    }

    fn update_sealed(
        &self,
        user: &UserId,
        message_id: &str,
        content: &EncryptedContent,
    ) -> Result<WriteOutcome> {
        let outcome = self.with_connection(user, false, |index, conn| {
            let previous: Option<Option<String>> = conn
                .query_row(
                    "SELECT EncryptedContentFile FROM SearchableMessage WHERE ID = ?1",
                    [message_id],
                    |r| r.get(0),
                )
                .optional()
                .map_err(|e| index.db(e))?;
            let Some(previous_file) = previous else {
                debug!(user = %user, message_id, "Update of unknown message ignored");
                return Ok(WriteOutcome::NotFound);
            };

            let placed = self.place_content(index, message_id, Some(content))?;
            conn.execute(
                "UPDATE SearchableMessage \
                 SET EncryptionIV = ?1, EncryptedContent = ?2, EncryptedContentFile = ?3, Size = ?4 \
                 WHERE ID = ?5",
                params![
                    content.iv,
                    placed.inline,
                    placed.file_column(),
                    content.size as i64,
                    message_id
                ],
            )
            .map_err(|e| index.db(e))?;

            // A side file is only orphaned when the new content went inline.
            if let (Some(old), None) = (previous_file, &placed.file) {
                remove_side_file(Path::new(&old));
            }
            Ok(WriteOutcome::Applied)
        })?;
        Ok(outcome.unwrap_or(WriteOutcome::NotFound))
    }

    /// Change the time, order, or labels of an indexed message.
    pub fn update_metadata(&self, user: &UserId, metadata: &MessageMetadata) -> Result<WriteOutcome> {
        let id = metadata.message_id.as_str();
        if let Some(state) = self.check_writable(user, id, "update") {
            return Ok(WriteOutcome::Disallowed(state));
        }
        let outcome = self.with_connection(user, false, |index, conn| {
            let changed = conn
                .execute(
                    "UPDATE SearchableMessage SET Time = ?1, MessageOrder = ?2, LabelIDs = ?3 WHERE ID = ?4",
                    params![
                        metadata.time,
                        metadata.order,
                        encode_labels(&metadata.label_ids),
                        id
                    ],
                )
                .map_err(|e| index.db(e))?;
            Ok(if changed == 0 {
                WriteOutcome::NotFound
            } else {
                WriteOutcome::Applied
            })
        })?;
        Ok(outcome.unwrap_or(WriteOutcome::NotFound))
    }

    /// Delete a message from the index. Deleting twice is harmless.
    pub fn remove(&self, user: &UserId, message_id: &str) -> Result<WriteOutcome> {
        if let Some(state) = self.check_writable(user, message_id, "remove") {
            return Ok(WriteOutcome::Disallowed(state));
        }
        let outcome = self.with_connection(user, false, |index, conn| {
            Ok(match delete_row(conn, message_id).map_err(|e| index.db(e))? {
                Some(_) => WriteOutcome::Applied,
                None => WriteOutcome::NotFound,
            })
        })?;
        Ok(outcome.unwrap_or(WriteOutcome::NotFound))
    }

    /// Delete every row but keep the (now empty) index file.
    ///
    /// Returns the number of rows removed.
    pub fn delete_all(&self, user: &UserId) -> Result<usize> {
        let removed = self.with_connection(user, false, |index, conn| {
            let removed = conn
                .execute("DELETE FROM SearchableMessage", [])
                .map_err(|e| index.db(e))?;
            match std::fs::remove_dir_all(&index.content_dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(IndexError::io(&index.content_dir, e)),
            }
            Ok(removed)
        })?;
        let removed = removed.unwrap_or(0);
        info!(user = %user, rows = removed, "Cleared search index");
        Ok(removed)
    }

    /// Remove `user`'s index files from disk.
    ///
    /// Returns whether an index existed.
    pub fn delete_store(&self, user: &UserId) -> Result<bool> {
        let index = self.handle(user);
        let mut slot = index.conn.lock();
        *slot = None;
        let existed = files::remove_store_files(&self.dir, user)
            .map_err(|e| IndexError::io(&index.db_path, e))?;
        if existed {
            info!(user = %user, path = %index.db_path.display(), "Deleted search index");
        }
        Ok(existed)
    }

    // ── Reads ───────────────────────────────────────────────────

    /// Fetch one row.
    pub fn get(&self, user: &UserId, message_id: &str) -> Result<Option<SearchableEntry>> {
        let entry = self.with_connection(user, false, |index, conn| {
            conn.query_row(
                &format!("SELECT {} FROM {TABLE} WHERE ID = ?1", schema::SELECT_COLUMNS),
                [message_id],
                schema::row_to_entry,
            )
            .optional()
            .map_err(|e| index.db(e))
        })?;
        Ok(entry.flatten())
    }

    /// Whether a row exists for `message_id`.
    pub fn contains(&self, user: &UserId, message_id: &str) -> Result<bool> {
        let found = self.with_connection(user, false, |index, conn| {
            row_exists(conn, message_id).map_err(|e| index.db(e))
        })?;
        Ok(found.unwrap_or(false))
    }

    /// The subset of `message_ids` that currently has a row.
    pub fn retain_existing<'a, I>(&self, user: &UserId, message_ids: I) -> Result<HashSet<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let found = self.with_connection(user, false, |index, conn| {
            let mut stmt = conn
                .prepare_cached("SELECT 1 FROM SearchableMessage WHERE ID = ?1")
                .map_err(|e| index.db(e))?;
            let mut found = HashSet::new();
            for id in message_ids {
                if stmt.exists([id]).map_err(|e| index.db(e))? {
                    found.insert(id.to_string());
                }
            }
            Ok(found)
        })?;
        Ok(found.unwrap_or_default())
    }

    /// Rows matching `query`, still encrypted.
    ///
    /// Rows whose columns cannot be read are skipped and logged.
    pub fn query(&self, user: &UserId, query: &IndexQuery) -> Result<Vec<SearchableEntry>> {
        let rows = self.with_connection(user, false, |index, conn| {
            let (sql, params) = query.to_sql();
            let mut stmt = conn.prepare_cached(&sql).map_err(|e| index.db(e))?;
            let rows = stmt
                .query_map(params_from_iter(params), schema::row_to_entry)
                .map_err(|e| index.db(e))?;
            let mut entries = Vec::new();
            for row in rows {
                match row {
                    Ok(entry) => entries.push(entry),
                    Err(
                        e @ (rusqlite::Error::FromSqlConversionFailure(..)
                        | rusqlite::Error::InvalidColumnType(..)
                        | rusqlite::Error::IntegralValueOutOfRange(..)),
                    ) => {
                        warn!(user = %user, error = %e, "Skipping unreadable index row");
                    }
                    Err(e) => return Err(index.db(e)),
                }
            }
            Ok(entries)
        })?;
        Ok(rows.unwrap_or_default())
    }

    /// Read a row's sealed content from its column or side file.
    ///
    /// Metadata-only rows yield `None`.
    pub fn load_content(&self, entry: &SearchableEntry) -> Result<Option<EncryptedContent>> {
        if !entry.is_content_complete() {
            return Ok(None);
        }
        let Some(ref iv) = entry.encryption_iv else {
            return Ok(None);
        };
        let ciphertext = match (&entry.encrypted_content, &entry.encrypted_content_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(IndexError::decode(&entry.message_id, "side file is missing"));
                }
                Err(e) => return Err(IndexError::io(path, e)),
            },
            (None, None) => return Ok(None),
        };
        crypto::encrypted_from_columns(&entry.message_id, iv.clone(), ciphertext).map(Some)
    }

    /// Load and open a row's content.
    pub fn decrypt_entry(&self, entry: &SearchableEntry) -> Result<Option<DecryptedContent>> {
        match self.load_content(entry)? {
            Some(sealed) => {
                crypto::decrypt_content(self.cipher(), &entry.message_id, &sealed).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Number of rows, metadata-only ones included.
    pub fn count(&self, user: &UserId) -> Result<usize> {
        self.count_where(user, None)
    }

    /// Number of rows holding searchable content.
    pub fn content_complete_count(&self, user: &UserId) -> Result<usize> {
        self.count_where(user, Some(CONTENT_COMPLETE))
    }

    fn count_where(&self, user: &UserId, condition: Option<&str>) -> Result<usize> {
        let sql = match condition {
            Some(cond) => format!("SELECT COUNT(*) FROM {TABLE} WHERE {cond}"),
            None => format!("SELECT COUNT(*) FROM {TABLE}"),
        };
        let count = self.with_connection(user, false, |index, conn| {
            conn.query_row(&sql, [], |r| r.get::<_, i64>(0))
                .map_err(|e| index.db(e))
        })?;
        Ok(count.unwrap_or(0).max(0) as usize)
    }

    /// On-disk footprint of `user`'s index, measured on the filesystem.
    pub fn size(&self, user: &UserId) -> Result<u64> {
        files::footprint(&self.dir, user).map_err(|e| IndexError::io(self.index_path(user), e))
    }

    /// Sum of the recorded ciphertext sizes, `-1` rows counting as zero.
    pub fn summed_row_size(&self, user: &UserId) -> Result<u64> {
        let total = self.with_connection(user, false, |index, conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(MAX(Size, 0)), 0) FROM SearchableMessage",
                [],
                |r| r.get::<_, i64>(0),
            )
            .map_err(|e| index.db(e))
        })?;
        Ok(total.unwrap_or(0).max(0) as u64)
    }

    fn oldest_entry(&self, user: &UserId) -> Result<Option<(i64, String)>> {
        let oldest = self.with_connection(user, false, |index, conn| {
            conn.query_row(
                &format!("SELECT Time, ID FROM {TABLE} ORDER BY {ORDER_ASC} LIMIT 1"),
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(|e| index.db(e))
        })?;
        Ok(oldest.flatten())
    }

    /// Time of the chronologically oldest row.
    pub fn oldest_entry_time(&self, user: &UserId) -> Result<Option<i64>> {
        Ok(self.oldest_entry(user)?.map(|(time, _)| time))
    }

    /// Message id of the chronologically oldest row.
    pub fn oldest_entry_id(&self, user: &UserId) -> Result<Option<String>> {
        Ok(self.oldest_entry(user)?.map(|(_, id)| id))
    }

    /// Date of the oldest row, formatted for display (`"Mar 04, 2021"`).
    pub fn oldest_entry_date(&self, user: &UserId) -> Result<Option<String>> {
        Ok(self.oldest_entry_time(user)?.map(format_entry_date))
    }

    // ── Content placement ───────────────────────────────────────

    fn place_content(
        &self,
        index: &UserIndex,
        message_id: &str,
        content: Option<&EncryptedContent>,
    ) -> Result<PlacedContent> {
        let Some(content) = content else {
            return Ok(PlacedContent::default());
        };
        if content.ciphertext.len() <= self.config.inline_content_limit {
            return Ok(PlacedContent {
                inline: Some(content.ciphertext.clone()),
                file: None,
            });
        }
        std::fs::create_dir_all(&index.content_dir)
            .map_err(|e| IndexError::io(&index.content_dir, e))?;
        let path = files::content_file_for(&index.content_dir, message_id);
        std::fs::write(&path, content.ciphertext.as_bytes()).map_err(|e| IndexError::io(&path, e))?;
        Ok(PlacedContent {
            inline: None,
            file: Some(path),
        })
    }
}

/// Where a row's ciphertext ended up.
#[derive(Debug, Default)]
struct PlacedContent {
    inline: Option<String>,
    file: Option<PathBuf>,
}

impl PlacedContent {
    fn file_column(&self) -> Option<String> {
        self.file
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    }
}

fn row_exists(conn: &Connection, message_id: &str) -> rusqlite::Result<bool> {
    conn.prepare_cached("SELECT 1 FROM SearchableMessage WHERE ID = ?1")?
        .exists([message_id])
}

/// Delete one row and its side file.
///
/// Returns the row's accounted size, or `None` if it did not exist.
pub(crate) fn delete_row(conn: &Connection, message_id: &str) -> rusqlite::Result<Option<u64>> {
    let row: Option<(i64, Option<String>)> = conn
        .query_row(
            "SELECT Size, EncryptedContentFile FROM SearchableMessage WHERE ID = ?1",
            [message_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((size, file)) = row else {
        return Ok(None);
    };
    conn.execute("DELETE FROM SearchableMessage WHERE ID = ?1", [message_id])?;
    if let Some(file) = file {
        remove_side_file(Path::new(&file));
    }
    Ok(Some(size.max(0) as u64))
}

/// Best effort: an orphaned side file only costs space.
fn remove_side_file(path: &Path) {
    if let Err(e) = files::remove_if_exists(path) {
        warn!(path = %path.display(), error = %e, "Could not remove side file");
    }
}
