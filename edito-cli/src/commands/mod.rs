pub mod config;
pub mod plugin;
pub mod start;

use anyhow::{Context, Result};
use edito_core::Settings;

/// Host settings from `edito.toml` and the environment
pub(crate) fn load_settings() -> Result<Settings> {
    Settings::load().context("Failed to load edito.toml")
}
