// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::control::ServiceContext;
use crate::instance::traits::{InstanceControl, InstanceStore};

/// How often a waiting instance looks at the slot to see whether a newer
/// instance took over.
const SUPERSEDE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Interlocks concurrently started processes through a shared instance slot.
///
/// The most recently registered process owns the slot. Any other process
/// notices the foreign id on its next check and reports an abort, so at most
/// one instance keeps driving updates. The slot is only read while waiting;
/// [`InstanceControl::abort_requested`] reports what the last wait saw.
pub struct InstanceMonitor {
    ctx: ServiceContext,
    store: Arc<dyn InstanceStore>,
    instance_id: String,
    startup_delay: Duration,
    registered: AtomicBool,
    superseded: AtomicBool,
}

impl InstanceMonitor {
    pub fn new(ctx: ServiceContext, store: Arc<dyn InstanceStore>, startup_delay: Duration) -> Self {
        Self {
            ctx,
            store,
            instance_id: Uuid::new_v4().simple().to_string(),
            startup_delay,
            registered: AtomicBool::new(false),
            superseded: AtomicBool::new(false),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Supersession seen by the last slot check. Once set it stays set.
    fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::Acquire)
    }

    /// Read the slot and remember whether another instance wrote its id into
    /// it after we registered.
    async fn check_superseded(&self) -> bool {
        if self.is_superseded() {
            return true;
        }
        if !self.is_registered() {
            return false;
        }
        match self.store.load().await {
            Ok(Some(owner)) if owner != self.instance_id => {
                info!(instance_id = %self.instance_id, owner = %owner, "Superseded by a newer instance");
                self.superseded.store(true, Ordering::Release);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, instance_id = %self.instance_id, "Failed to read instance slot");
                false
            }
        }
    }
}

#[async_trait]
impl InstanceControl for InstanceMonitor {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn register_instance(&self) -> anyhow::Result<()> {
        let previous = self.store.load().await?;
        self.store.store(&self.instance_id).await?;
        self.registered.store(true, Ordering::Release);

        match previous {
            Some(other) if other != self.instance_id => {
                info!(
                    instance_id = %self.instance_id,
                    other_instance = %other,
                    delay_secs = self.startup_delay.as_secs_f64(),
                    "Found other instance, delaying startup while it shuts down"
                );
                self.ctx.abort.wait(self.startup_delay).await;
            }
            _ => {
                info!(instance_id = %self.instance_id, "Registered instance");
            }
        }
        Ok(())
    }

    async fn unregister_instance(&self) {
        self.registered.store(false, Ordering::Release);

        // A successor may own the slot by now; leave it alone
        match self.store.clear_if_owner(&self.instance_id).await {
            Ok(true) => {
                info!(instance_id = %self.instance_id, "Unregistered instance");
            }
            Ok(false) => {
                debug!(instance_id = %self.instance_id, "Instance slot not owned by this instance, leaving it");
            }
            Err(e) => {
                warn!(error = %e, instance_id = %self.instance_id, "Failed to release instance slot");
            }
        }
    }

    async fn abort_requested(&self) -> bool {
        self.ctx.abort.is_triggered() || self.is_superseded()
    }

    async fn wait_for_abort(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.ctx.abort.is_triggered() || self.check_superseded().await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(SUPERSEDE_CHECK_INTERVAL);
            if self.ctx.abort.wait(slice).await {
                return true;
            }
        }
    }

    fn on_settings_changed(&self) {
        // Only reached for changes written by this process; edits made by an
        // external editor never trigger it and are picked up on restart.
        debug!(instance_id = %self.instance_id, "Settings changed, reload pending");
        self.ctx.settings_changed.raise();
    }
}
