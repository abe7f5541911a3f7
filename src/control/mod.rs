// SPDX-License-Identifier: GPL-3.0-only
pub mod context;
pub mod traits;
pub mod scheduler;

pub use context::{AbortSignal, ChangeFlag, ServiceContext};
pub use traits::{ConfigPort, UpdateOperation, UpdateOperationPort};
pub use scheduler::{LoopState, SchedulerError, SchedulingLoop};
