//! edito-core: extension lifecycle for the edito editor
//!
//! This crate turns configuration and plugin sources into loadable native
//! artifacts and loads them into the running editor:
//!
//! - **Configuration** - [`config::load_config`] interprets `config.rs`
//!   into [`ConfigDirective`]s without running it
//! - **Builds** - [`BuildPipeline`] compiles sources into `cdylib` artifacts
//!   in throwaway cargo workspaces
//! - **Plugins** - [`PluginManager`] opens artifacts and proxies calls into
//!   the plugins they export
//! - **Installation** - [`AutoInstaller`] builds plugins from git;
//!   [`RegistryClient`] downloads prebuilt ones
//! - **Startup** - [`Host`] runs all of the above in order against an
//!   [`EditorSurface`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use edito_core::{Host, MemorySurface, Settings};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load()?;
//!     let host = Host::new(settings, Arc::new(MemorySurface::new()));
//!     let report = host.start()?;
//!     println!("{} plugins loaded", report.loaded.len());
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod build;
pub mod config;
pub mod error;
pub mod host;
pub mod installer;
pub mod plugins;
pub mod registry;
pub mod settings;
pub mod surface;

// Re-export key types for convenience
pub use artifact::{Artifact, ArtifactKind, ArtifactStore, Freshness, Origin, StoreError};
pub use build::{BuildAction, BuildError, BuildOptions, BuildPipeline, BuildRequest};
pub use config::{ConfigError, ConfigScript, ParseError, SkippedCall, interpret, load_config};
pub use error::EditoError;
pub use host::{ConfigOrigin, Host, HostPaths, StartupError, StartupReport};
pub use installer::{AutoInstaller, InstallError, InstallReport, PluginBuilder, PluginSpec};
pub use plugins::{PluginHostError, PluginInfo, PluginManager};
pub use registry::{PackageRecord, RegistryClient, RegistryError};
pub use settings::{Settings, SettingsError};
pub use surface::{EditorSurface, MemorySurface};

pub use edito_plugin_api::{ConfigDirective, OptionValue};
