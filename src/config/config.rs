// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Upper bound for every interval setting, 100 years in seconds
pub const MAX_INTERVAL_SECS: u64 = 100 * 365 * 24 * 3600;

/// When the updater is allowed to synchronize the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Never update
    Disabled,
    /// Update once per process start
    Startup,
    /// Update whenever the update interval has elapsed
    Automatic,
}

impl FromStr for UpdateMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(UpdateMode::Disabled),
            "startup" => Ok(UpdateMode::Startup),
            "automatic" => Ok(UpdateMode::Automatic),
            other => Err(anyhow::anyhow!("Unknown update mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding the cached catalog
    pub catalog_db_path: PathBuf,

    /// File naming the currently active daemon instance
    pub instance_file: PathBuf,

    /// Remote catalog API endpoint URL
    pub backend_api_url: String,

    /// Optional authentication token for backend API
    pub backend_api_key: Option<String>,

    /// Pause between two scheduling ticks in seconds
    pub tick_interval_secs: u64,

    /// Startup delay in seconds when another instance was found running
    pub startup_delay_secs: u64,

    /// When updates are allowed to run
    pub update_mode: UpdateMode,

    /// Minimum age in seconds of the last sync before a new one is due
    pub update_interval_secs: u64,

    /// Minimum age in seconds of the last full sync before a new full one is due
    pub full_interval_secs: u64,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit log lines as JSON objects
    pub log_json: bool,
}

impl Config {
    /// Load configuration from TOML file with environment variable overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        Self::load_from(&config_path, |key| std::env::var(key).ok())
    }

    /// Location of the TOML file, `CATALOG_CONFIG` or `config.toml`
    pub fn config_path() -> PathBuf {
        std::env::var("CATALOG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }

    /// Load from `path` (defaults when missing), then apply overrides looked
    /// up through `env`.
    pub fn load_from<F>(path: &Path, env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::read_file(path)?;

        if let Some(val) = env("CATALOG_DB_PATH") {
            config.catalog_db_path = PathBuf::from(val);
        }
        if let Some(val) = env("CATALOG_INSTANCE_FILE") {
            config.instance_file = PathBuf::from(val);
        }
        if let Some(val) = env("CATALOG_BACKEND_API_URL") {
            config.backend_api_url = val;
        }
        if let Some(val) = env("CATALOG_BACKEND_API_KEY") {
            config.backend_api_key = Some(val);
        }
        if let Some(val) = env("CATALOG_TICK_INTERVAL_SECS") {
            config.tick_interval_secs = val.parse().context("CATALOG_TICK_INTERVAL_SECS")?;
        }
        if let Some(val) = env("CATALOG_STARTUP_DELAY_SECS") {
            config.startup_delay_secs = val.parse().context("CATALOG_STARTUP_DELAY_SECS")?;
        }
        if let Some(val) = env("CATALOG_UPDATE_MODE") {
            config.update_mode = val.parse()?;
        }
        if let Some(val) = env("CATALOG_UPDATE_INTERVAL_SECS") {
            config.update_interval_secs = val.parse().context("CATALOG_UPDATE_INTERVAL_SECS")?;
        }
        if let Some(val) = env("CATALOG_FULL_INTERVAL_SECS") {
            config.full_interval_secs = val.parse().context("CATALOG_FULL_INTERVAL_SECS")?;
        }
        if let Some(val) = env("CATALOG_LOG_LEVEL") {
            config.log_level = val;
        }
        if let Some(val) = env("CATALOG_LOG_JSON") {
            config.log_json = matches!(val.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Read the TOML file alone, no overrides
    pub fn read_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Write the configuration as TOML
    pub fn write_file(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = Url::parse(&self.backend_api_url)
            .with_context(|| format!("Invalid backend URL: {}", self.backend_api_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!(
                "Backend URL must use http or https: {}",
                self.backend_api_url
            ));
        }
        if self.tick_interval_secs == 0 {
            return Err(anyhow::anyhow!("tick_interval_secs must be at least 1"));
        }
        for (name, value) in [
            ("tick_interval_secs", self.tick_interval_secs),
            ("startup_delay_secs", self.startup_delay_secs),
            ("update_interval_secs", self.update_interval_secs),
            ("full_interval_secs", self.full_interval_secs),
        ] {
            if value > MAX_INTERVAL_SECS {
                return Err(anyhow::anyhow!(
                    "{} must not exceed {} seconds, got {}",
                    name,
                    MAX_INTERVAL_SECS,
                    value
                ));
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_db_path: PathBuf::from("catalog.db"),
            instance_file: PathBuf::from("catalog-sync.instance"),
            backend_api_url: String::from("http://localhost:3000/api"),
            backend_api_key: None,
            tick_interval_secs: 15,
            startup_delay_secs: 1,
            update_mode: UpdateMode::Automatic,
            update_interval_secs: 7200, // 2 hours
            full_interval_secs: 86400, // 1 day
            log_level: String::from("info"),
            log_json: false,
        }
    }
}
