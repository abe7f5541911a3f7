// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::updater::models::{CatalogEntry, SyncStatus};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Current sync bookkeeping
    async fn status(&self) -> anyhow::Result<SyncStatus>;

    /// Mark a sync as running
    async fn begin_update(&self, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Replace the whole catalog. Returns the new entry count.
    async fn replace_all(&self, entries: Vec<CatalogEntry>) -> anyhow::Result<u64>;

    /// Upsert `entries` and delete `removed`. Returns the new entry count.
    async fn apply_diff(&self, entries: Vec<CatalogEntry>, removed: Vec<String>) -> anyhow::Result<u64>;

    /// Mark the running sync as successfully completed at `at`, with the
    /// catalog complete up to `cursor`
    async fn finish_update(
        &self,
        full: bool,
        at: DateTime<Utc>,
        cursor: DateTime<Utc>,
        entry_count: u64,
    ) -> anyhow::Result<()>;

    /// Mark the running sync as failed
    async fn abort_update(&self) -> anyhow::Result<()>;

    /// Release the underlying connections
    async fn close(&self);
}
