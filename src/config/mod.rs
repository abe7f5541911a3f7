// SPDX-License-Identifier: GPL-3.0-only
pub mod config;
pub mod settings;

pub use config::{Config, UpdateMode};
pub use settings::Settings;
