// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum InstanceError {
    #[error("Failed to read instance slot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write instance slot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Instance slot directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("Instance slot task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Persisted slot naming the instance that currently owns the service.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Current owner, `None` when the slot is empty
    async fn load(&self) -> Result<Option<String>, InstanceError>;

    /// Claim the slot for `instance_id`
    async fn store(&self, instance_id: &str) -> Result<(), InstanceError>;

    /// Empty the slot
    async fn clear(&self) -> Result<(), InstanceError>;

    /// Empty the slot only while `instance_id` owns it. Returns whether the
    /// slot was released.
    async fn clear_if_owner(&self, instance_id: &str) -> Result<bool, InstanceError>;
}

/// Identity and shutdown arbitration for the running process.
#[async_trait]
pub trait InstanceControl: Send + Sync {
    fn instance_id(&self) -> &str;

    /// Mark this process as the active instance
    async fn register_instance(&self) -> anyhow::Result<()>;

    /// Release the active-instance mark. Never fails; problems are logged.
    async fn unregister_instance(&self);

    /// Non-blocking check for a pending shutdown
    async fn abort_requested(&self) -> bool;

    /// Block for up to `timeout`, returning early with `true` on shutdown
    async fn wait_for_abort(&self, timeout: Duration) -> bool;

    /// Host notification that stored settings were modified
    fn on_settings_changed(&self);
}
