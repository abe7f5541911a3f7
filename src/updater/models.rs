// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No sync running
    Idle,
    /// A sync started and has not finished yet
    Updating,
    /// The last sync failed part way
    Aborted,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Updating => "updating",
            SyncState::Aborted => "aborted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(SyncState::Idle),
            "updating" => Some(SyncState::Updating),
            "aborted" => Some(SyncState::Aborted),
            _ => None,
        }
    }
}

/// Persisted bookkeeping about past synchronizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,

    /// When the last sync attempt started
    pub started_at: Option<DateTime<Utc>>,

    /// Completion time of the last successful sync of either kind
    pub last_update: Option<DateTime<Utc>>,

    /// Completion time of the last successful full sync
    pub last_full_update: Option<DateTime<Utc>>,

    /// Point in time the cached catalog is known to be complete up to. The
    /// next differential asks for changes since then.
    pub sync_cursor: Option<DateTime<Utc>>,

    /// Number of entries in the cached catalog
    pub entry_count: u64,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            started_at: None,
            last_update: None,
            last_full_update: None,
            sync_cursor: None,
            entry_count: 0,
        }
    }
}

/// One catalog item as delivered by the backend. The payload is stored
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,

    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Body of a full or differential catalog response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogPayload {
    #[serde(default)]
    pub entries: Vec<CatalogEntry>,

    /// Ids deleted since the requested point in time (differential only)
    #[serde(default)]
    pub removed: Vec<String>,

    /// Backend time the snapshot was taken, when the backend reports it
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}
