//! Host startup sequence
//!
//! [`Host::start`] runs the extension lifecycle once, in order:
//!
//! 1. interpret the configuration script, compiling it when its artifact is
//!    missing or stale, and apply the directives to the editor surface. A
//!    script the interpreter cannot parse runs from its compiled artifact,
//!    brought up to date first;
//! 2. hand `install_plugin` requests to the auto-installer;
//! 3. rebuild stale local plugin sources into the artifact store;
//! 4. load every installed artifact plus the plugins named by
//!    `load_plugin`.
//!
//! Per-item failures in steps 2-4 are logged and collected in the
//! [`StartupReport`]. Only a configuration that cannot be used at all, or
//! an unusable artifact store, stops startup.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use edito_plugin_api::ConfigDirective;

use crate::artifact::{ArtifactStore, Origin, StoreError, artifact_file_name, check_staleness};
use crate::build::{BuildAction, BuildError, BuildPipeline, BuildRequest};
use crate::config::{ConfigError, ParseError, SkippedCall, load_config};
use crate::installer::{AutoInstaller, InstallReport, PluginSpec};
use crate::plugins::{PluginHostError, PluginManager};
use crate::settings::Settings;
use crate::surface::{EditorSurface, apply_directive, capabilities_for};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration {path} is unusable: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error("Configuration {path} does not parse ({parse}) and the compiled configuration failed to load: {source}")]
    Fallback {
        path: PathBuf,
        parse: ParseError,
        #[source]
        source: PluginHostError,
    },

    #[error("Failed to compile configuration {path}: {source}")]
    ConfigBuild {
        path: PathBuf,
        #[source]
        source: BuildError,
    },

    #[error("Plugin store is unusable: {0}")]
    Store(#[from] StoreError),
}

/// Filesystem locations the host works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub config_source: PathBuf,
    pub compiled_config: PathBuf,
    /// Directory of local plugin sources (`*.rs`)
    pub plugin_source_dir: PathBuf,
    /// Artifact store
    pub store_dir: PathBuf,
}

impl HostPaths {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            config_source: edito_paths::config_source(),
            compiled_config: edito_paths::compiled_config(),
            plugin_source_dir: settings.plugin_source_dir.clone(),
            store_dir: settings.plugin_dir.clone(),
        }
    }

    /// The standard layout under `config_dir` and `data_dir`
    pub fn with_dirs(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            config_source: config_dir.join("config.rs"),
            compiled_config: config_dir.join(artifact_file_name("config")),
            plugin_source_dir: config_dir.join("plugins"),
            store_dir: data_dir.join("plugins"),
        }
    }
}

/// Where the applied configuration came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// No configuration file
    #[default]
    None,
    Interpreted,
    /// The source failed to parse; the compiled artifact ran instead
    Compiled { path: PathBuf },
}

#[derive(Debug)]
pub struct LocalBuildFailure {
    pub name: String,
    pub source: PathBuf,
    pub reason: String,
    /// An older artifact exists and will be loaded
    pub kept_previous: bool,
}

#[derive(Debug)]
pub struct LoadFailure {
    pub name: String,
    pub error: PluginHostError,
}

/// Everything startup did
#[derive(Debug, Default)]
pub struct StartupReport {
    pub config: ConfigOrigin,
    /// What happened to the compiled configuration, when compilation is on
    pub config_build: Option<BuildAction>,
    pub directives: Vec<ConfigDirective>,
    pub skipped: Vec<SkippedCall>,
    pub installs: InstallReport,
    /// Local plugins rebuilt from source
    pub built: Vec<String>,
    pub build_failures: Vec<LocalBuildFailure>,
    pub loaded: Vec<String>,
    pub load_failures: Vec<LoadFailure>,
}

impl StartupReport {
    /// Number of isolated failures and skipped calls
    pub fn warning_count(&self) -> usize {
        self.skipped.len()
            + self.installs.failed.len()
            + self.build_failures.len()
            + self.load_failures.len()
            + usize::from(matches!(self.config_build, Some(BuildAction::FellBack { .. })))
    }
}

/// The editor host: owns the artifact store, the plugin registry and the
/// surface extensions act on.
pub struct Host {
    settings: Settings,
    paths: HostPaths,
    pipeline: BuildPipeline,
    installer: AutoInstaller,
    manager: PluginManager,
    surface: Arc<dyn EditorSurface>,
}

impl Host {
    /// Host using the default locations
    pub fn new(settings: Settings, surface: Arc<dyn EditorSurface>) -> Self {
        let paths = HostPaths::from_settings(&settings);
        Self::with_paths(settings, paths, surface)
    }

    pub fn with_paths(settings: Settings, paths: HostPaths, surface: Arc<dyn EditorSurface>) -> Self {
        let pipeline = BuildPipeline::new(settings.build.clone());
        let installer =
            AutoInstaller::with_pipeline(ArtifactStore::new(&paths.store_dir), pipeline.clone());
        let manager = PluginManager::new(capabilities_for(surface.clone()));
        Self {
            settings,
            paths,
            pipeline,
            installer,
            manager,
            surface,
        }
    }

    /// Replace the auto-installer, e.g. to acquire plugins another way
    pub fn with_installer(mut self, installer: AutoInstaller) -> Self {
        self.installer = installer;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &HostPaths {
        &self.paths
    }

    pub fn store(&self) -> &ArtifactStore {
        self.installer.store()
    }

    pub fn pipeline(&self) -> &BuildPipeline {
        &self.pipeline
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    pub fn surface(&self) -> &Arc<dyn EditorSurface> {
        &self.surface
    }

    /// Run the startup sequence
    pub fn start(&self) -> Result<StartupReport, StartupError> {
        let mut report = StartupReport::default();

        self.load_configuration(&mut report)?;

        self.store().ensure_dir()?;
        let specs: Vec<PluginSpec> = report
            .directives
            .iter()
            .filter_map(PluginSpec::from_directive)
            .collect();
        if !specs.is_empty() {
            report.installs = self.installer.check_and_install(&specs);
        }

        self.rebuild_local_plugins(&mut report);
        self.load_plugins(&mut report)?;

        tracing::info!(
            loaded = report.loaded.len(),
            warnings = report.warning_count(),
            "Startup complete"
        );
        Ok(report)
    }

    fn load_configuration(&self, report: &mut StartupReport) -> Result<(), StartupError> {
        let source = &self.paths.config_source;
        match load_config(source) {
            Ok(script) => {
                if source.is_file() {
                    report.config = ConfigOrigin::Interpreted;
                    if self.settings.compile_config {
                        report.config_build = Some(self.compile_configuration()?);
                    }
                }
                for directive in &script.directives {
                    apply_directive(self.surface.as_ref(), directive);
                }
                report.directives = script.directives;
                report.skipped = script.skipped;
            }
            Err(ConfigError::Parse(parse)) => {
                let compiled_path = &self.paths.compiled_config;
                tracing::warn!(
                    path = %source.display(),
                    error = %parse,
                    fallback = %compiled_path.display(),
                    "Configuration does not parse, using compiled configuration"
                );
                if self.settings.compile_config {
                    report.config_build = Some(self.compile_configuration()?);
                } else if check_staleness(source, compiled_path)?.needs_build() {
                    tracing::error!(
                        path = %source.display(),
                        "Compiled configuration is missing or stale and compiling is disabled"
                    );
                    return Err(StartupError::Config {
                        path: source.clone(),
                        source: ConfigError::Parse(parse),
                    });
                }

                let compiled = self
                    .manager
                    .load_compiled_config(compiled_path)
                    .map_err(|e| {
                        tracing::error!(error = %e, "Compiled configuration failed to load");
                        StartupError::Fallback {
                            path: source.clone(),
                            parse,
                            source: e,
                        }
                    })?;

                for directive in &compiled.directives {
                    if !matches!(directive, ConfigDirective::RegisterHook { .. }) {
                        apply_directive(self.surface.as_ref(), directive);
                    }
                }
                for (event, handler) in compiled.hooks {
                    self.surface.register_hook(&event, handler);
                }
                report.config = ConfigOrigin::Compiled {
                    path: compiled.path,
                };
                report.directives = compiled.directives;
            }
            Err(e) => {
                tracing::error!(path = %source.display(), error = %e, "Configuration is unusable");
                return Err(StartupError::Config {
                    path: source.clone(),
                    source: e,
                });
            }
        }
        Ok(())
    }

    /// Bring the compiled configuration up to date with its source. Only a
    /// failed build with no previous artifact to fall back to is an error.
    fn compile_configuration(&self) -> Result<BuildAction, StartupError> {
        let request = BuildRequest::config(&self.paths.config_source, &self.paths.compiled_config);
        match self.pipeline.ensure_fresh(&request) {
            Ok(freshened) => Ok(freshened.action),
            Err(e) => {
                tracing::error!(
                    path = %request.source.display(),
                    error = %e,
                    "Configuration failed to compile and no previous build exists"
                );
                Err(StartupError::ConfigBuild {
                    path: request.source,
                    source: e,
                })
            }
        }
    }

    fn rebuild_local_plugins(&self, report: &mut StartupReport) {
        let sources = match local_plugin_sources(&self.paths.plugin_source_dir) {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(
                    dir = %self.paths.plugin_source_dir.display(),
                    error = %e,
                    "Cannot read local plugin sources"
                );
                return;
            }
        };

        for source in sources {
            let Some(name) = source.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let output = match self.store().artifact_path(&name) {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(plugin = %name, error = %e, "Local plugin has an unusable name");
                    report.build_failures.push(LocalBuildFailure {
                        name,
                        source,
                        reason: e.to_string(),
                        kept_previous: false,
                    });
                    continue;
                }
            };
            let request = BuildRequest::plugin(&source, output);

            match self.pipeline.ensure_fresh(&request) {
                Ok(freshened) => match freshened.action {
                    BuildAction::UpToDate => {}
                    BuildAction::Rebuilt => {
                        if let Err(e) = self.store().record(
                            &name,
                            Origin::Local {
                                source: source.clone(),
                            },
                        ) {
                            tracing::warn!(plugin = %name, error = %e, "Failed to record local plugin");
                        }
                        report.built.push(name);
                    }
                    BuildAction::FellBack { reason } => {
                        report.build_failures.push(LocalBuildFailure {
                            name,
                            source,
                            reason,
                            kept_previous: true,
                        });
                    }
                },
                Err(e) => {
                    tracing::warn!(plugin = %name, error = %e, "Local plugin failed to build");
                    report.build_failures.push(LocalBuildFailure {
                        name,
                        source,
                        reason: e.to_string(),
                        kept_previous: false,
                    });
                }
            }
        }
    }

    fn load_plugins(&self, report: &mut StartupReport) -> Result<(), StartupError> {
        let mut names = self.store().list()?;
        let mut seen: BTreeSet<String> = names.iter().cloned().collect();
        let requested = report.directives.iter().filter_map(|directive| match directive {
            ConfigDirective::LoadPlugin { name } => Some(name),
            _ => None,
        });
        for name in requested {
            if seen.insert(name.clone()) {
                names.push(name.clone());
            }
        }

        for name in names {
            if self.manager.is_loaded(&name) {
                tracing::debug!(plugin = %name, "Plugin already loaded");
                continue;
            }
            let Ok(path) = self.store().artifact_path(&name) else {
                tracing::warn!(plugin = %name, "Not a plugin name, nothing to load");
                report.load_failures.push(LoadFailure {
                    error: PluginHostError::NotFound { name: name.clone() },
                    name,
                });
                continue;
            };
            match self.manager.load(&path) {
                Ok(registered) => report.loaded.push(registered),
                Err(error) => {
                    tracing::warn!(plugin = %name, error = %error, "Plugin failed to load");
                    report.load_failures.push(LoadFailure { name, error });
                }
            }
        }
        Ok(())
    }
}

/// `*.rs` files directly inside `dir`, sorted. A missing directory has none.
fn local_plugin_sources(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut sources = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("rs") {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}
