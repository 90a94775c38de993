//! Per-user indexing state machine.
//!
//! ```text
//! disabled         ─▶ metadataIndexing
//! metadataIndexing ─▶ downloading
//! downloading      ─▶ paused | lowstorage | background | complete | partial
//! paused           ─▶ downloading
//! lowstorage       ─▶ downloading
//! background       ─▶ downloading | complete
//! complete         ─▶ refresh | background
//! refresh          ─▶ complete
//! any              ─▶ disabled
//! ```
//!
//! `partial` only leaves through `disabled`.
//!
//! Writes to the index are legal in every state except `disabled`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{IndexError, Result};
use crate::model::UserId;

/// Indexing state of one user's search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexState {
    Disabled,
    MetadataIndexing,
    Downloading,
    Paused,
    Background,
    Refresh,
    #[serde(rename = "lowstorage")]
    LowStorage,
    Partial,
    Complete,
}

impl IndexState {
    pub const ALL: [IndexState; 9] = [
        IndexState::Disabled,
        IndexState::MetadataIndexing,
        IndexState::Downloading,
        IndexState::Paused,
        IndexState::Background,
        IndexState::Refresh,
        IndexState::LowStorage,
        IndexState::Partial,
        IndexState::Complete,
    ];

    /// Whether index rows may be inserted, updated, or removed.
    pub fn is_writable(self) -> bool {
        self != IndexState::Disabled
    }

    /// Whether message content is still being fetched and indexed.
    pub fn is_indexing(self) -> bool {
        matches!(
            self,
            IndexState::MetadataIndexing
                | IndexState::Downloading
                | IndexState::Background
                | IndexState::Refresh
        )
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(self, next: IndexState) -> bool {
        use IndexState::*;

        if self == next || next == Disabled {
            return true;
        }
        matches!(
            (self, next),
            (Disabled, MetadataIndexing)
                | (MetadataIndexing, Downloading)
                | (Downloading, Paused)
                | (Downloading, LowStorage)
                | (Downloading, Background)
                | (Downloading, Complete)
                | (Downloading, Partial)
                | (Paused, Downloading)
                | (LowStorage, Downloading)
                | (Background, Downloading)
                | (Background, Complete)
                | (Complete, Refresh)
                | (Complete, Background)
                | (Refresh, Complete)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndexState::Disabled => "disabled",
            IndexState::MetadataIndexing => "metadataIndexing",
            IndexState::Downloading => "downloading",
            IndexState::Paused => "paused",
            IndexState::Background => "background",
            IndexState::Refresh => "refresh",
            IndexState::LowStorage => "lowstorage",
            IndexState::Partial => "partial",
            IndexState::Complete => "complete",
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        IndexState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown indexing state '{s}'"))
    }
}

/// Process-wide registry of indexing states, one per user.
///
/// Users without an entry are `disabled`.
#[derive(Debug, Default)]
pub struct IndexStates {
    states: RwLock<HashMap<UserId, IndexState>>,
}

impl IndexStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for `user`.
    pub fn get(&self, user: &UserId) -> IndexState {
        self.states
            .read()
            .get(user)
            .copied()
            .unwrap_or(IndexState::Disabled)
    }

    /// Move `user` to `next`, validating the transition.
    ///
    /// Returns the previous state.
    pub fn transition(&self, user: &UserId, next: IndexState) -> Result<IndexState> {
        let mut states = self.states.write();
        let current = states.get(user).copied().unwrap_or(IndexState::Disabled);
        if !current.can_transition_to(next) {
            warn!(user = %user, from = %current, to = %next, "Rejected indexing state change");
            return Err(IndexError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        if next == IndexState::Disabled {
            states.remove(user);
        } else {
            states.insert(user.clone(), next);
        }
        if current != next {
            debug!(user = %user, from = %current, to = %next, "Indexing state changed");
        }
        Ok(current)
    }

    /// Start indexing for `user` (`disabled → metadataIndexing`).
    pub fn enable(&self, user: &UserId) -> Result<IndexState> {
        self.transition(user, IndexState::MetadataIndexing)
    }

    /// Forget `user`'s state, which is equivalent to `disabled`.
    pub fn reset(&self, user: &UserId) {
        self.states.write().remove(user);
    }
}
