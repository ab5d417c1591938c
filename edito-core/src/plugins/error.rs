//! Plugin host error types

use std::path::PathBuf;
use thiserror::Error;

use edito_plugin_api::PluginError;

/// Errors from loading, registering and driving plugins
#[derive(Error, Debug)]
pub enum PluginHostError {
    /// The dynamic library could not be opened
    #[error("Failed to load plugin library {path}: {source}")]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("{path} does not export {symbol}")]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// API version mismatch between edito and the extension
    #[error("API version mismatch in {path}: edito expects {expected}, extension has {found}")]
    ApiVersionMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    /// The constructor returned a null instance
    #[error("{path} returned no plugin instance")]
    InvalidInstance { path: PathBuf },

    #[error("Plugin '{name}' failed to initialise: {source}")]
    InitFailed {
        name: String,
        #[source]
        source: PluginError,
    },

    #[error("A plugin named '{name}' is already loaded")]
    DuplicateName { name: String },

    #[error("Plugin '{name}' not found")]
    NotFound { name: String },

    #[error("Plugin '{name}' failed: {source}")]
    Execute {
        name: String,
        #[source]
        source: PluginError,
    },
}

impl PluginHostError {
    /// Whether the error happened while opening an artifact, before any
    /// plugin code ran
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            PluginHostError::LibraryLoad { .. }
                | PluginHostError::MissingSymbol { .. }
                | PluginHostError::ApiVersionMismatch { .. }
                | PluginHostError::InvalidInstance { .. }
        )
    }
}
