//! Plugin loading for edito
//!
//! - [`PluginManager`]: opens plugin artifacts, registers them by name and
//!   proxies calls into them
//! - [`PluginHostError`]: error types for plugin operations
//!
//! # Artifact contract
//!
//! A plugin artifact is a `cdylib` built with `export_plugin!`, exporting
//! `_edito_plugin_create`, `_edito_plugin_api_version` and
//! `_edito_plugin_destroy`. A compiled configuration exports
//! `_edito_config_init` and `_edito_config_api_version` instead and is run
//! with [`PluginManager::load_compiled_config`].
//!
//! # Example
//!
//! ```ignore
//! use edito_core::plugins::PluginManager;
//!
//! let manager = PluginManager::new(capabilities);
//! let name = manager.load(&store.artifact_path("file-tree")?)?;
//! manager.execute(&name, "toggle", &[])?;
//! ```

mod error;
mod manager;

pub use error::PluginHostError;
pub use manager::{CompiledConfig, LoadedPlugin, PluginInfo, PluginManager};
