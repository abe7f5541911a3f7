// SPDX-License-Identifier: GPL-3.0-only
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::control::traits::{ConfigPort, UpdateOperation, UpdateOperationPort};
use crate::instance::InstanceControl;

/// Default pause between two ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Running,
    Draining,
    Stopped,
}

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduling loop is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: LoopState,
        actual: LoopState,
    },

    #[error("Startup failed: {0:#}")]
    Startup(anyhow::Error),

    #[error("Tick {tick} failed: {error:#}")]
    Tick { tick: u64, error: anyhow::Error },
}

/// Drives the update engine: one poll per tick, an interruptible pause
/// between ticks, and ordered startup and teardown around it.
pub struct SchedulingLoop {
    monitor: Arc<dyn InstanceControl>,
    config: Arc<dyn ConfigPort>,
    updater: Arc<dyn UpdateOperationPort>,
    tick_interval: Duration,
    state: LoopState,
    engine_initialized: bool,
    ticks: u64,
}

impl SchedulingLoop {
    pub fn new(
        monitor: Arc<dyn InstanceControl>,
        config: Arc<dyn ConfigPort>,
        updater: Arc<dyn UpdateOperationPort>,
    ) -> Self {
        Self {
            monitor,
            config,
            updater,
            tick_interval: DEFAULT_TICK_INTERVAL,
            state: LoopState::Uninitialized,
            engine_initialized: false,
            ticks: 0,
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Number of ticks started so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn expect_state(&self, expected: LoopState) -> Result<(), SchedulerError> {
        if self.state != expected {
            return Err(SchedulerError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Register the instance, start the engine and reset activity tracking.
    /// Any failure is fatal; the caller should still run [`exit`](Self::exit)
    /// to release whatever was acquired.
    pub async fn init(&mut self) -> Result<(), SchedulerError> {
        self.expect_state(LoopState::Uninitialized)?;
        info!(instance_id = %self.monitor.instance_id(), "Init");

        self.monitor
            .register_instance()
            .await
            .map_err(SchedulerError::Startup)?;
        self.updater.init().await.map_err(SchedulerError::Startup)?;
        self.engine_initialized = true;
        self.config.reset_user_activity().await;

        self.state = LoopState::Running;
        Ok(())
    }

    /// Tick until an abort is requested. Errors raised by the engine end the
    /// loop and are returned as-is.
    pub async fn run(&mut self) -> Result<(), SchedulerError> {
        self.expect_state(LoopState::Running)?;
        info!(
            instance_id = %self.monitor.instance_id(),
            interval_secs = self.tick_interval.as_secs_f64(),
            "Starting up"
        );

        let result = self.tick_until_abort().await;

        self.state = LoopState::Draining;
        info!(instance_id = %self.monitor.instance_id(), ticks = self.ticks, "Shutting down");
        result
    }

    async fn tick_until_abort(&mut self) -> Result<(), SchedulerError> {
        while !self.monitor.abort_requested().await {
            self.ticks += 1;
            let tick = self.ticks;
            let fail = |error: anyhow::Error| SchedulerError::Tick { tick, error };

            if self.config.reload().await.map_err(fail)? {
                info!(tick, "Configuration has changed, reloading the updater");
                self.updater.reload().await.map_err(fail)?;
            }

            let operation = self.updater.current_update_operation().await.map_err(fail)?;
            if operation != UpdateOperation::None && self.monitor.abort_requested().await {
                debug!(tick, %operation, "Abort requested, skipping update");
                break;
            }
            match operation {
                UpdateOperation::Full => {
                    info!(tick, "Initiating full update");
                    self.updater.update(true).await.map_err(fail)?;
                }
                UpdateOperation::Differential => {
                    info!(tick, "Initiating differential update");
                    self.updater.update(false).await.map_err(fail)?;
                }
                UpdateOperation::None => {
                    debug!(tick, "No update due");
                }
            }

            if self.monitor.wait_for_abort(self.tick_interval).await {
                debug!(tick, "Abort requested while waiting");
                break;
            }
        }
        Ok(())
    }

    /// Stop the engine, then release the instance. Safe to call after a
    /// failed `init` and more than once.
    pub async fn exit(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        self.state = LoopState::Draining;
        info!(instance_id = %self.monitor.instance_id(), "Exit");

        if self.engine_initialized {
            if let Err(e) = self.updater.exit().await {
                error!(error = %e, "Failed to shut down the updater");
            }
            self.engine_initialized = false;
        }
        self.monitor.unregister_instance().await;

        self.state = LoopState::Stopped;
    }
}
