// SPDX-License-Identifier: GPL-3.0-only
pub mod models;
pub mod traits;
pub mod schedule;
pub mod sqlite;
pub mod backend;

pub use backend::BackendUpdater;
