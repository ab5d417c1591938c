//! Error types for edito-core

use thiserror::Error;

use crate::artifact::StoreError;
use crate::build::BuildError;
use crate::config::{ConfigError, ParseError};
use crate::host::StartupError;
use crate::installer::InstallError;
use crate::plugins::PluginHostError;
use crate::registry::RegistryError;
use crate::settings::SettingsError;

/// Top-level error type for edito-core
#[derive(Error, Debug)]
pub enum EditoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Configuration error: {0}")]
    Parse(#[from] ParseError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginHostError),

    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Startup failed: {0}")]
    Startup(#[from] StartupError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_errors_convert() {
        let parse = ParseError {
            line: 3,
            column: 7,
            message: "unexpected `}`".into(),
        };
        let err: EditoError = parse.into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Parse error at line 3, column 7: unexpected `}`"
        );

        let err: EditoError = PluginHostError::NotFound {
            name: "file-tree".into(),
        }
        .into();
        assert!(matches!(err, EditoError::Plugin(_)));
    }

    #[test]
    fn test_question_mark_lifts_errors() {
        fn uninstall() -> Result<(), EditoError> {
            Err(RegistryError::NotInstalled {
                name: "theme".into(),
            })?
        }
        assert!(matches!(uninstall(), Err(EditoError::Registry(_))));
    }
}
