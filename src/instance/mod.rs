// SPDX-License-Identifier: GPL-3.0-only
pub mod traits;
pub mod file;
pub mod monitor;

pub use traits::{InstanceControl, InstanceError, InstanceStore};
pub use file::FileInstanceStore;
pub use monitor::InstanceMonitor;
