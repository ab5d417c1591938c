//! XDG Base Directory paths for edito.
//!
//! The editor keeps its configuration script, compiled configuration and
//! local plugin sources under the config directory, and installed plugin
//! artifacts under the data directory.

use std::path::PathBuf;

const APP_DIR: &str = "edito";

/// Get the edito config directory.
///
/// Returns `$XDG_CONFIG_HOME/edito` if set, otherwise `~/.config/edito`.
///
/// # Examples
///
/// ```
/// use edito_paths::config_dir;
///
/// let config = config_dir();
/// let script = config.join("config.rs");
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// Get the edito data directory.
///
/// Returns `$XDG_DATA_HOME/edito` if set, otherwise `~/.local/share/edito`.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// The user's configuration script.
pub fn config_source() -> PathBuf {
    config_dir().join("config.rs")
}

/// Compiled form of [`config_source`], e.g. `config.so`.
pub fn compiled_config() -> PathBuf {
    config_dir().join(format!("config.{}", std::env::consts::DLL_EXTENSION))
}

/// Host settings file.
pub fn settings_file() -> PathBuf {
    config_dir().join("edito.toml")
}

/// Directory holding single-file plugin sources written by the user.
pub fn plugin_source_dir() -> PathBuf {
    config_dir().join("plugins")
}

/// Directory holding installed plugin artifacts.
pub fn plugin_dir() -> PathBuf {
    data_dir().join("plugins")
}

fn xdg_dir(var: &str, home_relative: &str) -> PathBuf {
    if let Some(base) = std::env::var_os(var).filter(|v| !v.is_empty()) {
        PathBuf::from(base).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(home_relative).join(APP_DIR)
    } else {
        PathBuf::from(home_relative).join(APP_DIR)
    }
}
