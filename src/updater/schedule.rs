// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use crate::config::{Config, UpdateMode};
use crate::control::UpdateOperation;
use crate::updater::models::{SyncState, SyncStatus};

/// A sync marked as running for longer than this (seconds) is assumed dead.
pub const STALE_UPDATE_AFTER_SECS: i64 = 3 * 3600;

/// Pause in seconds after a failed sync before trying again.
pub const RETRY_AFTER_FAILURE_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePolicy {
    pub mode: UpdateMode,
    pub update_interval: Duration,
    pub full_interval: Duration,

    /// Start of the current user-activity window, used by startup mode
    pub session_start: DateTime<Utc>,
}

impl UpdatePolicy {
    pub fn from_config(config: &Config, session_start: DateTime<Utc>) -> anyhow::Result<Self> {
        Ok(Self {
            mode: config.update_mode,
            update_interval: interval("update_interval_secs", config.update_interval_secs)?,
            full_interval: interval("full_interval_secs", config.full_interval_secs)?,
            session_start,
        })
    }
}

fn interval(name: &str, secs: u64) -> anyhow::Result<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .with_context(|| format!("{} out of range: {}", name, secs))
}

/// Decide which synchronization is due at `now`.
pub fn decide_operation(now: DateTime<Utc>, status: &SyncStatus, policy: &UpdatePolicy) -> UpdateOperation {
    if policy.mode == UpdateMode::Disabled {
        return UpdateOperation::None;
    }

    match (status.state, status.started_at) {
        (SyncState::Updating, Some(started)) if now - started < Duration::seconds(STALE_UPDATE_AFTER_SECS) => {
            return UpdateOperation::None;
        }
        (SyncState::Aborted, Some(started)) if now - started < Duration::seconds(RETRY_AFTER_FAILURE_SECS) => {
            return UpdateOperation::None;
        }
        _ => {}
    }

    let Some(last_update) = status.last_update else {
        return UpdateOperation::Full;
    };

    let due = match policy.mode {
        UpdateMode::Startup => last_update < policy.session_start,
        UpdateMode::Automatic => now - last_update >= policy.update_interval,
        UpdateMode::Disabled => false,
    };
    if !due {
        return UpdateOperation::None;
    }

    let full_due = status
        .last_full_update
        .is_none_or(|last_full| now - last_full >= policy.full_interval);
    if full_due {
        UpdateOperation::Full
    } else {
        UpdateOperation::Differential
    }
}
