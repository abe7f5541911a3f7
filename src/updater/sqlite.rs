// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{info, warn};
use crate::updater::models::{CatalogEntry, SyncState, SyncStatus};
use crate::updater::traits::CatalogStore;

pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub async fn new(db_path: &Path) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %db_path.display(), "Opened catalog database");
        Ok(store)
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_entries (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Single-row table, id is pinned to 1
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_status (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state TEXT NOT NULL,
                started_at TEXT,
                last_update TEXT,
                last_full_update TEXT,
                sync_cursor TEXT,
                entry_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        self.migrate_schema().await?;

        sqlx::query("INSERT OR IGNORE INTO sync_status (id, state) VALUES (1, 'idle')")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn migrate_schema(&self) -> anyhow::Result<()> {
        let result = sqlx::query("SELECT sync_cursor FROM sync_status LIMIT 1")
            .fetch_optional(&self.pool)
            .await;

        if result.is_err() {
            // Left NULL: the next sync has no cursor and runs as a full one
            info!("Migrating catalog schema: adding sync_cursor");
            sqlx::query("ALTER TABLE sync_status ADD COLUMN sync_cursor TEXT")
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    async fn count_entries(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

fn parse_timestamp(value: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    value
        .map(|v| Ok(DateTime::parse_from_rfc3339(&v)?.with_timezone(&Utc)))
        .transpose()
}

async fn upsert_entry(
    conn: &mut sqlx::SqliteConnection,
    entry: &CatalogEntry,
    now: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO catalog_entries (id, payload, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
        "#,
    )
    .bind(&entry.id)
    .bind(serde_json::to_string(&entry.payload)?)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn status(&self) -> anyhow::Result<SyncStatus> {
        let row = sqlx::query(
            "SELECT state, started_at, last_update, last_full_update, sync_cursor, entry_count FROM sync_status WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        let state_str: String = row.get("state");
        let state = SyncState::parse(&state_str).unwrap_or_else(|| {
            warn!(state = %state_str, "Unknown sync state, treating as aborted");
            SyncState::Aborted
        });

        Ok(SyncStatus {
            state,
            started_at: parse_timestamp(row.get("started_at"))?,
            last_update: parse_timestamp(row.get("last_update"))?,
            last_full_update: parse_timestamp(row.get("last_full_update"))?,
            sync_cursor: parse_timestamp(row.get("sync_cursor"))?,
            entry_count: row.get::<i64, _>("entry_count") as u64,
        })
    }

    async fn begin_update(&self, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE sync_status SET state = ?, started_at = ? WHERE id = 1")
            .bind(SyncState::Updating.as_str())
            .bind(at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_all(&self, entries: Vec<CatalogEntry>) -> anyhow::Result<u64> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM catalog_entries")
            .execute(&mut *tx)
            .await?;
        for entry in &entries {
            upsert_entry(&mut tx, entry, &now).await?;
        }
        tx.commit().await?;

        self.count_entries().await
    }

    async fn apply_diff(&self, entries: Vec<CatalogEntry>, removed: Vec<String>) -> anyhow::Result<u64> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for id in &removed {
            sqlx::query("DELETE FROM catalog_entries WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        for entry in &entries {
            upsert_entry(&mut tx, entry, &now).await?;
        }
        tx.commit().await?;

        self.count_entries().await
    }

    async fn finish_update(
        &self,
        full: bool,
        at: DateTime<Utc>,
        cursor: DateTime<Utc>,
        entry_count: u64,
    ) -> anyhow::Result<()> {
        let at = at.to_rfc3339();
        let cursor = cursor.to_rfc3339();
        if full {
            sqlx::query(
                "UPDATE sync_status SET state = ?, last_update = ?, last_full_update = ?, sync_cursor = ?, entry_count = ? WHERE id = 1",
            )
            .bind(SyncState::Idle.as_str())
            .bind(&at)
            .bind(&at)
            .bind(&cursor)
            .bind(entry_count as i64)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE sync_status SET state = ?, last_update = ?, sync_cursor = ?, entry_count = ? WHERE id = 1",
            )
            .bind(SyncState::Idle.as_str())
            .bind(&at)
            .bind(&cursor)
            .bind(entry_count as i64)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn abort_update(&self) -> anyhow::Result<()> {
        sqlx::query("UPDATE sync_status SET state = ? WHERE id = 1")
            .bind(SyncState::Aborted.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_temp_dir;
    use serde_json::json;

    fn entry(id: &str, title: &str) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            payload: json!({ "title": title }),
        }
    }

    async fn payload_of(store: &SqliteCatalogStore, id: &str) -> Option<String> {
        sqlx::query_scalar("SELECT payload FROM catalog_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_status() {
        let dir = create_temp_dir();
        let store = SqliteCatalogStore::new(&dir.path().join("catalog.db")).await.unwrap();

        assert_eq!(store.status().await.unwrap(), SyncStatus::default());
    }

    #[tokio::test]
    async fn test_reopen_keeps_status() {
        let dir = create_temp_dir();
        let path = dir.path().join("catalog.db");
        let at = Utc::now();
        {
            let store = SqliteCatalogStore::new(&path).await.unwrap();
            store.begin_update(at).await.unwrap();
            store.finish_update(true, at, at, 0).await.unwrap();
            store.close().await;
        }

        let store = SqliteCatalogStore::new(&path).await.unwrap();
        let status = store.status().await.unwrap();
        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.last_full_update.map(|t| t.timestamp()), Some(at.timestamp()));
    }

    #[tokio::test]
    async fn test_replace_all_drops_previous_entries() {
        let dir = create_temp_dir();
        let store = SqliteCatalogStore::new(&dir.path().join("catalog.db")).await.unwrap();

        store.replace_all(vec![entry("a", "A"), entry("b", "B")]).await.unwrap();
        let count = store.replace_all(vec![entry("c", "C")]).await.unwrap();

        assert_eq!(count, 1);
        assert!(payload_of(&store, "a").await.is_none());
        assert!(payload_of(&store, "c").await.is_some());
    }

    #[tokio::test]
    async fn test_apply_diff_upserts_and_removes() {
        let dir = create_temp_dir();
        let store = SqliteCatalogStore::new(&dir.path().join("catalog.db")).await.unwrap();
        store.replace_all(vec![entry("a", "A"), entry("b", "B")]).await.unwrap();

        let count = store
            .apply_diff(vec![entry("b", "B2"), entry("c", "C")], vec!["a".to_string()])
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert!(payload_of(&store, "a").await.is_none());
        let b: serde_json::Value = serde_json::from_str(&payload_of(&store, "b").await.unwrap()).unwrap();
        assert_eq!(b["title"], "B2");
    }

    #[tokio::test]
    async fn test_differential_finish_keeps_last_full() {
        let dir = create_temp_dir();
        let store = SqliteCatalogStore::new(&dir.path().join("catalog.db")).await.unwrap();
        let full_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let diff_at = DateTime::parse_from_rfc3339("2026-01-01T02:00:00Z").unwrap().with_timezone(&Utc);

        let diff_cursor = diff_at - chrono::Duration::minutes(5);

        store.finish_update(true, full_at, full_at, 10).await.unwrap();
        store.finish_update(false, diff_at, diff_cursor, 12).await.unwrap();

        let status = store.status().await.unwrap();
        assert_eq!(status.last_full_update, Some(full_at));
        assert_eq!(status.last_update, Some(diff_at));
        assert_eq!(status.sync_cursor, Some(diff_cursor));
        assert_eq!(status.entry_count, 12);
    }

    #[tokio::test]
    async fn test_begin_then_abort() {
        let dir = create_temp_dir();
        let store = SqliteCatalogStore::new(&dir.path().join("catalog.db")).await.unwrap();
        let at = Utc::now();

        store.begin_update(at).await.unwrap();
        assert_eq!(store.status().await.unwrap().state, SyncState::Updating);

        store.abort_update().await.unwrap();
        let status = store.status().await.unwrap();
        assert_eq!(status.state, SyncState::Aborted);
        assert!(status.started_at.is_some());
        assert_eq!(status.last_update, None);
    }

    #[tokio::test]
    async fn test_migrates_status_table_without_cursor() {
        let dir = create_temp_dir();
        let path = dir.path().join("catalog.db");
        {
            let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
            let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
            sqlx::query(
                r#"
                CREATE TABLE sync_status (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    state TEXT NOT NULL,
                    started_at TEXT,
                    last_update TEXT,
                    last_full_update TEXT,
                    entry_count INTEGER NOT NULL DEFAULT 0
                )
                "#,
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                "INSERT INTO sync_status (id, state, last_update, last_full_update, entry_count) \
                 VALUES (1, 'idle', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00', 4)",
            )
            .execute(&pool)
            .await
            .unwrap();
            pool.close().await;
        }

        let store = SqliteCatalogStore::new(&path).await.unwrap();
        let status = store.status().await.unwrap();
        assert_eq!(status.entry_count, 4);
        assert!(status.last_update.is_some());
        assert_eq!(status.sync_cursor, None);
    }
}
