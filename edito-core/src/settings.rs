//! Host settings from `edito.toml`
//!
//! ```toml
//! registry_url = "https://packages.edito.dev"
//! compile_config = true
//!
//! [build]
//! cargo = "cargo"
//! release = true
//! offline = false
//! api_dependency = { path = "/src/edito/edito-plugin-api" }
//! ```
//!
//! Every key is optional. `api_dependency` defaults to the plugin API crate
//! the host was built with. `EDITO_REGISTRY_URL` and `EDITO_CARGO` override
//! the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::build::{BuildOptions, default_api_dependency};
use crate::registry::DEFAULT_REGISTRY_URL;

pub const REGISTRY_URL_ENV: &str = "EDITO_REGISTRY_URL";
pub const CARGO_ENV: &str = "EDITO_CARGO";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings as stored in TOML (optional fields so defaults can fill gaps)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSettings {
    pub registry_url: Option<String>,
    pub compile_config: Option<bool>,
    /// Overrides `<config>/plugins`
    pub plugin_source_dir: Option<PathBuf>,
    /// Overrides `<data>/plugins`
    pub plugin_dir: Option<PathBuf>,
    #[serde(default)]
    pub build: RawBuildSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBuildSettings {
    pub cargo: Option<PathBuf>,
    pub release: Option<bool>,
    pub offline: Option<bool>,
    pub api_dependency: Option<toml::Value>,
    pub work_dir: Option<PathBuf>,
}

/// Final settings with defaults applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub registry_url: String,
    /// Compile the configuration script in addition to interpreting it
    pub compile_config: bool,
    pub plugin_source_dir: PathBuf,
    pub plugin_dir: PathBuf,
    pub build: BuildOptions,
}

impl Default for Settings {
    fn default() -> Self {
        RawSettings::default().finalize()
    }
}

impl RawSettings {
    pub fn finalize(self) -> Settings {
        let defaults = BuildOptions::default();
        Settings {
            registry_url: self
                .registry_url
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
            compile_config: self.compile_config.unwrap_or(true),
            plugin_source_dir: self
                .plugin_source_dir
                .unwrap_or_else(edito_paths::plugin_source_dir),
            plugin_dir: self.plugin_dir.unwrap_or_else(edito_paths::plugin_dir),
            build: BuildOptions {
                cargo: self.build.cargo.unwrap_or(defaults.cargo),
                release: self.build.release.unwrap_or(defaults.release),
                offline: self.build.offline.unwrap_or(defaults.offline),
                api_dependency: self
                    .build
                    .api_dependency
                    .unwrap_or_else(default_api_dependency),
                work_dir: self.build.work_dir.or(defaults.work_dir),
            },
        }
    }

    /// Apply `EDITO_REGISTRY_URL` and `EDITO_CARGO`
    fn apply_env(mut self) -> Self {
        if let Some(url) = non_empty_env(REGISTRY_URL_ENV) {
            self.registry_url = Some(url);
        }
        if let Some(cargo) = non_empty_env(CARGO_ENV) {
            self.build.cargo = Some(PathBuf::from(cargo));
        }
        self
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Settings {
    /// Load from the default location
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&edito_paths::settings_file())
    }

    /// Load from `path`; a missing file means defaults
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RawSettings::default(),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(Self::from_raw(raw))
    }

    /// Finalize `raw` after environment overrides
    pub fn from_raw(raw: RawSettings) -> Self {
        raw.apply_env().finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        // SAFETY: tests touching the environment are serialised.
        unsafe {
            std::env::remove_var(REGISTRY_URL_ENV);
            std::env::remove_var(CARGO_ENV);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_for_missing_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join("edito.toml")).unwrap();

        assert_eq!(settings.registry_url, DEFAULT_REGISTRY_URL);
        assert!(settings.compile_config);
        assert_eq!(settings.build.cargo, PathBuf::from("cargo"));
        assert!(settings.build.release);
        assert!(!settings.build.offline);
        assert_eq!(settings.build.api_dependency, default_api_dependency());
        assert!(settings.plugin_dir.ends_with("edito/plugins"));
    }

    #[test]
    #[serial]
    fn test_partial_file_keeps_defaults() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edito.toml");
        std::fs::write(
            &path,
            r#"
compile_config = false

[build]
offline = true
api_dependency = { path = "/src/edito/edito-plugin-api" }
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(!settings.compile_config);
        assert!(settings.build.offline);
        assert!(settings.build.release);
        assert_eq!(
            settings.build.api_dependency["path"].as_str(),
            Some("/src/edito/edito-plugin-api")
        );
        assert_eq!(settings.registry_url, DEFAULT_REGISTRY_URL);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edito.toml");
        std::fs::write(&path, "registry_url = \"https://file.example\"\n").unwrap();

        unsafe {
            std::env::set_var(REGISTRY_URL_ENV, "http://127.0.0.1:9000");
            std::env::set_var(CARGO_ENV, "/opt/rust/bin/cargo");
        }
        let settings = Settings::load_from(&path).unwrap();
        clear_env();

        assert_eq!(settings.registry_url, "http://127.0.0.1:9000");
        assert_eq!(settings.build.cargo, PathBuf::from("/opt/rust/bin/cargo"));
    }

    #[test]
    #[serial]
    fn test_invalid_file_is_an_error() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edito.toml");
        std::fs::write(&path, "compile_config = \"maybe\"\n").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }
}
