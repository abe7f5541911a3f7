// SPDX-License-Identifier: GPL-3.0-only
mod config;
mod control;
mod instance;
mod logging;
mod updater;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use config::{Config, Settings};
use control::{AbortSignal, SchedulingLoop, ServiceContext};
use instance::{FileInstanceStore, InstanceMonitor, InstanceStore};
use logging::setup_logging;
use updater::BackendUpdater;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = Config::config_path();
    let config = Config::load()?;

    // Initialize logging
    setup_logging(&config.log_level, config.log_json)?;

    info!("Starting catalog-sync-daemon v{}", env!("CARGO_PKG_VERSION"));

    let ctx = ServiceContext::new();
    spawn_shutdown_listener(ctx.abort.clone());

    let instance_store: Arc<dyn InstanceStore> =
        Arc::new(FileInstanceStore::new(config.instance_file.clone()));
    let monitor = Arc::new(InstanceMonitor::new(
        ctx.clone(),
        instance_store,
        config.startup_delay(),
    ));

    let settings = Arc::new(
        Settings::new(config.clone(), Some(config_path), ctx.settings_changed.clone())
            .with_listener(monitor.clone()),
    );
    let updater = Arc::new(BackendUpdater::new(Arc::clone(&settings), &config)?);

    let mut scheduler = SchedulingLoop::new(monitor, settings, updater)
        .with_tick_interval(config.tick_interval());

    if let Err(e) = scheduler.init().await {
        error!(error = %e, "Startup failed");
        scheduler.exit().await;
        return Err(e.into());
    }

    let result = scheduler.run().await;
    if let Err(ref e) = result {
        error!(error = %e, "Scheduling loop stopped");
    }

    scheduler.exit().await;
    result?;

    info!("Shutdown complete");
    Ok(())
}

/// Trigger `abort` on Ctrl+C or SIGTERM.
fn spawn_shutdown_listener(abort: AbortSignal) {
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await {
            info!("Received shutdown signal");
            abort.trigger();
        }
    });
}

/// Returns `false` when no signal handler could be installed.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> bool {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    match unix_signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            let ctrl_c = async {
                match signal::ctrl_c().await {
                    Ok(()) => true,
                    Err(err) => {
                        // Keep waiting for SIGTERM alone
                        error!(error = %err, "Unable to listen for Ctrl+C");
                        std::future::pending::<bool>().await
                    }
                }
            };
            tokio::select! {
                received = ctrl_c => received,
                received = terminate.recv() => received.is_some(),
            }
        }
        Err(err) => {
            warn!(error = %err, "Unable to listen for SIGTERM, only Ctrl+C will stop the daemon");
            wait_for_ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> bool {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> bool {
    match signal::ctrl_c().await {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
            false
        }
    }
}
