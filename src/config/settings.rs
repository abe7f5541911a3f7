// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::control::{ChangeFlag, ConfigPort};
use crate::instance::InstanceControl;

/// Live settings of the running daemon.
///
/// Changes become visible to the scheduling loop only through the change flag,
/// which is raised by the instance monitor's settings callback. The callback
/// fires for [`Settings::save`] calls made inside this process; edits to the
/// file by anything else stay unnoticed until the daemon restarts.
pub struct Settings {
    source: Option<PathBuf>,
    current: RwLock<Config>,
    pending: RwLock<Option<Config>>,
    changed: ChangeFlag,
    listener: Option<Arc<dyn InstanceControl>>,
    last_activity: RwLock<DateTime<Utc>>,
}

impl Settings {
    pub fn new(config: Config, source: Option<PathBuf>, changed: ChangeFlag) -> Self {
        Self {
            source,
            current: RwLock::new(config),
            pending: RwLock::new(None),
            changed,
            listener: None,
            last_activity: RwLock::new(Utc::now()),
        }
    }

    /// Route change notifications through `listener`
    pub fn with_listener(mut self, listener: Arc<dyn InstanceControl>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Copy of the configuration currently in effect
    pub async fn snapshot(&self) -> Config {
        self.current.read().await.clone()
    }

    /// Start of the current user-activity window
    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read().await
    }

    /// Persist `config` and announce the change. The running configuration
    /// is swapped on the loop's next `reload`.
    pub async fn save(&self, config: &Config) -> anyhow::Result<()> {
        config.validate()?;
        match &self.source {
            Some(path) => {
                let path = path.clone();
                let config = config.clone();
                tokio::task::spawn_blocking(move || config.write_file(&path)).await??;
            }
            None => *self.pending.write().await = Some(config.clone()),
        }

        match &self.listener {
            Some(listener) => listener.on_settings_changed(),
            None => self.changed.raise(),
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigPort for Settings {
    async fn reload(&self) -> anyhow::Result<bool> {
        if !self.changed.take() {
            return Ok(false);
        }

        match &self.source {
            Some(path) => match Config::load_from(path, |key| std::env::var(key).ok()) {
                Ok(config) => *self.current.write().await = config,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Failed to reload settings, keeping current ones");
                    return Ok(false);
                }
            },
            None => {
                if let Some(config) = self.pending.write().await.take() {
                    *self.current.write().await = config;
                }
            }
        }

        info!("Settings reloaded");
        Ok(true)
    }

    async fn reset_user_activity(&self) {
        *self.last_activity.write().await = Utc::now();
    }
}
