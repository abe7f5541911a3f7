// SPDX-License-Identifier: GPL-3.0-only
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Process-wide cooperative shutdown signal.
///
/// Once triggered it stays triggered. Clones share the same state.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait up to `timeout` for the signal.
    ///
    /// Returns `true` if the signal fired before the timeout elapsed or had
    /// already fired when called.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let fired = async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };
        // Elapsed and fired both end up reading the flag
        let _ = tokio::time::timeout(timeout, fired).await;
        self.is_triggered()
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-bit "something changed" marker shared between a notifier and the
/// loop that consumes it.
#[derive(Debug, Clone, Default)]
pub struct ChangeFlag {
    raised: Arc<AtomicBool>,
}

impl ChangeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Read and clear in one step.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

/// Process-wide state owned by `main` and handed to every component that needs
/// to observe shutdown or configuration changes.
#[derive(Debug, Clone, Default)]
pub struct ServiceContext {
    pub abort: AbortSignal,
    pub settings_changed: ChangeFlag,
}

impl ServiceContext {
    pub fn new() -> Self {
        Self::default()
    }
}
