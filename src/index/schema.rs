//! On-disk layout of a user's search index.
//!
//! ```text
//! SearchableMessage
//! ┌──────────────────────┬──────────────────────────────────────────┐
//! │ ID                   │ TEXT PRIMARY KEY (message id)            │
//! │ Time                 │ INTEGER, seconds since epoch             │
//! │ MessageOrder         │ INTEGER, tie-break within a mailbox      │
//! │ LabelIDs             │ TEXT, JSON array of label ids            │
//! │ EncryptionIV         │ TEXT NULL, base64 nonce                  │
//! │ EncryptedContent     │ TEXT NULL, base64 ciphertext (inline)    │
//! │ EncryptedContentFile │ TEXT NULL, side file path (spilled)      │
//! │ Size                 │ INTEGER, raw ciphertext bytes, -1 unknown│
//! └──────────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! The database is created with `auto_vacuum = FULL` so that deleting rows
//! shrinks the file right away and the filesystem size tracks the content.

use std::path::PathBuf;

use rusqlite::{Connection, Row};

use crate::model::entry::{decode_labels, SearchableEntry};

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Name of the single table in each index file.
pub const TABLE: &str = "SearchableMessage";

/// Must run before the first table is created to take effect.
const PRAGMAS: &str = "PRAGMA auto_vacuum = FULL;";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS SearchableMessage (
    ID TEXT PRIMARY KEY,
    Time INTEGER NOT NULL DEFAULT 0,
    MessageOrder INTEGER NOT NULL DEFAULT 0,
    LabelIDs TEXT NOT NULL DEFAULT '',
    EncryptionIV TEXT DEFAULT NULL,
    EncryptedContent TEXT DEFAULT NULL,
    EncryptedContentFile TEXT DEFAULT NULL,
    Size INTEGER NOT NULL DEFAULT -1
);

CREATE INDEX IF NOT EXISTS idx_searchable_time
    ON SearchableMessage(Time, MessageOrder, ID);
";

/// Column list matching [`row_to_entry`].
pub const SELECT_COLUMNS: &str =
    "ID, Time, MessageOrder, LabelIDs, EncryptionIV, EncryptedContent, EncryptedContentFile, Size";

/// Chronological order used by every scan (oldest first).
pub const ORDER_ASC: &str = "Time ASC, MessageOrder ASC, ID ASC";

/// Reverse chronological order (newest first).
pub const ORDER_DESC: &str = "Time DESC, MessageOrder DESC, ID DESC";

/// Condition selecting content-complete rows.
pub const CONTENT_COMPLETE: &str =
    "EncryptionIV IS NOT NULL AND ((EncryptedContent IS NULL) <> (EncryptedContentFile IS NULL))";

/// Create the table and indexes if they do not exist yet.
pub fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(PRAGMAS)?;
    conn.execute_batch(SCHEMA)?;
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

/// Map a row selected with [`SELECT_COLUMNS`].
pub fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<SearchableEntry> {
    let labels: String = row.get(3)?;
    let file: Option<String> = row.get(6)?;
    Ok(SearchableEntry {
        message_id: row.get(0)?,
        time: row.get(1)?,
        order: row.get(2)?,
        label_ids: decode_labels(&labels),
        encryption_iv: row.get(4)?,
        encrypted_content: row.get(5)?,
        encrypted_content_file: file.map(PathBuf::from),
        encrypted_content_size: row.get(7)?,
    })
}
