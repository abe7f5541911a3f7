// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::{Config, Settings};
use crate::control::{UpdateOperation, UpdateOperationPort};
use crate::updater::models::CatalogPayload;
use crate::updater::schedule::{decide_operation, UpdatePolicy};
use crate::updater::sqlite::SqliteCatalogStore;
use crate::updater::traits::CatalogStore;

/// Where the catalog comes from and where it is cached.
#[derive(Debug, Clone, PartialEq)]
struct Endpoint {
    base_url: String,
    api_key: Option<String>,
    db_path: PathBuf,
}

impl Endpoint {
    fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.backend_api_url.clone(),
            api_key: config.backend_api_key.clone(),
            db_path: config.catalog_db_path.clone(),
        }
    }
}

/// Update engine that mirrors the backend catalog into SQLite.
pub struct BackendUpdater {
    client: Client,
    settings: Arc<Settings>,
    endpoint: RwLock<Endpoint>,
    store: RwLock<Option<Arc<dyn CatalogStore>>>,
}

impl BackendUpdater {
    pub fn new(settings: Arc<Settings>, config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .user_agent(concat!("catalog-sync-daemon/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            settings,
            endpoint: RwLock::new(Endpoint::from_config(config)),
            store: RwLock::new(None),
        })
    }

    async fn store(&self) -> anyhow::Result<Arc<dyn CatalogStore>> {
        self.store
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Catalog database is not open"))
    }

    async fn open_store(&self, endpoint: &Endpoint) -> anyhow::Result<()> {
        let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(&endpoint.db_path).await?);
        if let Some(previous) = self.store.write().await.replace(store) {
            previous.close().await;
        }
        Ok(())
    }

    fn build_request(&self, endpoint: &Endpoint, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", endpoint.base_url.trim_end_matches('/'), path);
        let mut request = self.client.get(&url);

        if let Some(ref key) = endpoint.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        request
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<CatalogPayload> {
        let endpoint = self.endpoint.read().await.clone();
        let request = match since {
            Some(since) => self
                .build_request(&endpoint, "catalog/diff")
                .query(&[("since", since.to_rfc3339())]),
            None => self.build_request(&endpoint, "catalog/full"),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Catalog fetch failed: {} - {}", status, text));
        }

        Ok(response.json().await?)
    }

    async fn synchronize(&self, store: &dyn CatalogStore, full: bool) -> anyhow::Result<u64> {
        let started = Utc::now();
        let since = if full { None } else { store.status().await?.sync_cursor };
        // Without a previous sync there is nothing to diff against
        let full = full || since.is_none();

        store.begin_update(started).await?;
        let payload = self.fetch(since).await?;
        info!(
            full,
            entries = payload.entries.len(),
            removed = payload.removed.len(),
            "Fetched catalog from backend"
        );

        // Changes made while the fetch was in flight belong to the next diff
        let cursor = payload.generated_at.unwrap_or(started);
        let count = if full {
            store.replace_all(payload.entries).await?
        } else {
            store.apply_diff(payload.entries, payload.removed).await?
        };
        store.finish_update(full, Utc::now(), cursor, count).await?;
        Ok(count)
    }
}

#[async_trait]
impl UpdateOperationPort for BackendUpdater {
    async fn init(&self) -> anyhow::Result<()> {
        let endpoint = self.endpoint.read().await.clone();
        self.open_store(&endpoint).await?;
        info!(backend = %endpoint.base_url, "Updater initialized");
        Ok(())
    }

    async fn reload(&self) -> anyhow::Result<()> {
        let config = self.settings.snapshot().await;
        let next = Endpoint::from_config(&config);
        let previous = std::mem::replace(&mut *self.endpoint.write().await, next.clone());

        if previous.db_path != next.db_path {
            info!(
                from = %previous.db_path.display(),
                to = %next.db_path.display(),
                "Catalog database moved, reopening"
            );
            self.open_store(&next).await?;
        }
        if previous.base_url != next.base_url {
            info!(backend = %next.base_url, "Backend endpoint changed");
        }
        Ok(())
    }

    async fn current_update_operation(&self) -> anyhow::Result<UpdateOperation> {
        let status = self.store().await?.status().await?;
        let config = self.settings.snapshot().await;
        let policy = UpdatePolicy::from_config(&config, self.settings.last_activity().await)?;
        Ok(decide_operation(Utc::now(), &status, &policy))
    }

    async fn update(&self, full: bool) -> anyhow::Result<()> {
        let store = self.store().await?;

        match self.synchronize(store.as_ref(), full).await {
            Ok(count) => {
                info!(full, entries = count, "Catalog update completed");
            }
            Err(e) => {
                // Leave it to the schedule to try again later
                error!(error = %e, full, "Catalog update failed");
                if let Err(e) = store.abort_update().await {
                    warn!(error = %e, "Failed to record aborted update");
                }
            }
        }
        Ok(())
    }

    async fn exit(&self) -> anyhow::Result<()> {
        if let Some(store) = self.store.write().await.take() {
            store.close().await;
        }
        info!("Updater stopped");
        Ok(())
    }
}
