//! Persisted index rows and the metadata they carry.

use std::collections::BTreeSet;
use std::path::PathBuf;

/// Separator of the older plain-text form of the label column.
pub const LABEL_SEPARATOR: char = ';';

/// Searchable metadata of one message, available before its content.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageMetadata {
    /// Primary key inside a user's index.
    pub message_id: String,
    /// Seconds since the Unix epoch. Drives ordering and eviction.
    pub time: i64,
    /// Stable tie-break between messages sharing the same `time`.
    pub order: i64,
    /// Labels (folders) the message currently belongs to.
    pub label_ids: BTreeSet<String>,
}

impl MessageMetadata {
    pub fn new(message_id: impl Into<String>, time: i64, order: i64) -> Self {
        Self {
            message_id: message_id.into(),
            time,
            order,
            label_ids: BTreeSet::new(),
        }
    }

    /// Builder-style helper to attach labels.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_ids = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// One row of a user's search index, exactly as persisted.
///
/// Content is still encrypted here. A row is either content-complete
/// (IV plus exactly one of inline content or side file) or metadata-only
/// (no IV, no content), the latter existing only until content is
/// backfilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchableEntry {
    pub message_id: String,
    pub time: i64,
    pub order: i64,
    pub label_ids: BTreeSet<String>,
    /// Base64 nonce used to seal the content.
    pub encryption_iv: Option<String>,
    /// Base64 ciphertext stored inline.
    pub encrypted_content: Option<String>,
    /// Side file holding the base64 ciphertext when it was too large to
    /// store inline.
    pub encrypted_content_file: Option<PathBuf>,
    /// Raw ciphertext length in bytes, or `-1` when unknown.
    pub encrypted_content_size: i64,
}

impl SearchableEntry {
    /// Whether this row holds searchable content.
    pub fn is_content_complete(&self) -> bool {
        self.encryption_iv.is_some()
            && (self.encrypted_content.is_some() != self.encrypted_content_file.is_some())
    }

    /// Identity fields of the row.
    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata {
            message_id: self.message_id.clone(),
            time: self.time,
            order: self.order,
            label_ids: self.label_ids.clone(),
        }
    }

    /// Byte count used for eviction accounting (the `-1` sentinel counts as 0).
    pub fn accounted_size(&self) -> u64 {
        self.encrypted_content_size.max(0) as u64
    }
}

/// Serialize a label set into its column form, a JSON array of strings
/// (`["0","5","custom"]`).
pub fn encode_labels(labels: &BTreeSet<String>) -> String {
    serde_json::to_string(labels).unwrap_or_else(|_| String::from("[]"))
}

/// Human form of an entry time, e.g. `"Mar 04, 2021"`.
///
/// Out-of-range values fall back to the raw number of seconds.
pub fn format_entry_date(time: i64) -> String {
    match chrono::DateTime::from_timestamp(time, 0) {
        Some(dt) => dt.format("%b %d, %Y").to_string(),
        None => time.to_string(),
    }
}

/// Parse a label column back into a set.
///
/// Columns that are not a JSON array are read as the older
/// `LABEL_SEPARATOR`-joined form, dropping empty segments.
pub fn decode_labels(raw: &str) -> BTreeSet<String> {
    if let Ok(labels) = serde_json::from_str::<BTreeSet<String>>(raw) {
        return labels;
    }
    raw.split(LABEL_SEPARATOR)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
