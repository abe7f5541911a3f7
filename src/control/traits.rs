// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the update engine wants done on the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateOperation {
    None,
    Full,
    Differential,
}

impl fmt::Display for UpdateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateOperation::None => "none",
            UpdateOperation::Full => "full",
            UpdateOperation::Differential => "differential",
        };
        f.write_str(label)
    }
}

/// The catalog synchronization engine driven by the scheduling loop.
#[async_trait]
pub trait UpdateOperationPort: Send + Sync {
    /// Prepare the engine; called once before the first tick
    async fn init(&self) -> anyhow::Result<()>;

    /// Apply a changed configuration
    async fn reload(&self) -> anyhow::Result<()>;

    /// Decide which operation is due right now
    async fn current_update_operation(&self) -> anyhow::Result<UpdateOperation>;

    /// Run a full (`true`) or differential (`false`) synchronization.
    /// May take as long as the transfer takes.
    async fn update(&self, full: bool) -> anyhow::Result<()>;

    /// Release everything acquired in `init`
    async fn exit(&self) -> anyhow::Result<()>;
}

/// Settings storage as seen by the scheduling loop.
#[async_trait]
pub trait ConfigPort: Send + Sync {
    /// Returns `true` exactly once per detected configuration change
    async fn reload(&self) -> anyhow::Result<bool>;

    /// Restart user-activity tracking
    async fn reset_user_activity(&self);
}
