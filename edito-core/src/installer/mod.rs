//! Auto-installer: builds requested plugins from git into the artifact store
//!
//! A spec whose artifact already exists is skipped without touching the
//! network or the compiler. Failures are isolated per spec and nothing is
//! rolled back.

mod spec;

pub use spec::{GitPin, LATEST, PluginSpec};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use thiserror::Error;

use crate::artifact::{ArtifactStore, Origin, StoreError};
use crate::build::{BuildError, BuildPipeline, LibrarySource};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Plugin '{name}' was requested more than once")]
    DuplicateName { name: String },

    #[error("Failed to build plugin '{name}': {source}")]
    Build {
        name: String,
        #[source]
        source: BuildError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a plugin artifact is produced from its spec
pub trait PluginBuilder: Send + Sync {
    /// Build `spec` and write the artifact to `output`
    fn build(&self, spec: &PluginSpec, output: &Path) -> Result<(), BuildError>;
}

/// Builds plugins with cargo: the repository becomes the single dependency
/// of a generated crate that re-exports it as a `cdylib`.
#[derive(Debug, Clone, Default)]
pub struct CargoPluginBuilder {
    pipeline: BuildPipeline,
}

impl CargoPluginBuilder {
    pub fn new(pipeline: BuildPipeline) -> Self {
        Self { pipeline }
    }

    /// Generated crate for `spec`
    pub fn library(spec: &PluginSpec) -> LibrarySource {
        let mut dependencies = std::collections::BTreeMap::new();
        dependencies.insert("plugin".to_string(), spec.dependency());
        LibrarySource {
            lib_rs: format!(
                "// Generated by edito for {} ({})\n\npub use plugin::*;\n",
                spec.name, spec.repository
            ),
            dependencies,
        }
    }
}

impl PluginBuilder for CargoPluginBuilder {
    fn build(&self, spec: &PluginSpec, output: &Path) -> Result<(), BuildError> {
        self.pipeline.build_library(&Self::library(spec), output)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
}

#[derive(Debug)]
pub struct InstallFailure {
    pub name: String,
    pub error: InstallError,
}

/// Result of installing a list of specs
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<InstallFailure>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct AutoInstaller {
    store: ArtifactStore,
    builder: Box<dyn PluginBuilder>,
    /// Parent of staging directories, the system temp dir if unset
    staging_dir: Option<PathBuf>,
}

impl AutoInstaller {
    pub fn new(store: ArtifactStore, builder: Box<dyn PluginBuilder>) -> Self {
        Self {
            store,
            builder,
            staging_dir: None,
        }
    }

    /// Installer building with cargo through `pipeline`. Artifacts are
    /// staged under the pipeline's work directory.
    pub fn with_pipeline(store: ArtifactStore, pipeline: BuildPipeline) -> Self {
        let staging_dir = pipeline.options().work_dir.clone();
        Self::new(store, Box::new(CargoPluginBuilder::new(pipeline))).with_staging_dir(staging_dir)
    }

    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }

    fn staging(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("edito-install-");
        match &self.staging_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
    }

    /// Make sure the artifact for `spec` exists
    pub fn install(&self, spec: &PluginSpec) -> Result<InstallOutcome, InstallError> {
        crate::artifact::check_name(&spec.name)?;
        if self.store.contains(&spec.name) {
            tracing::debug!(plugin = %spec.name, "Plugin already installed");
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        tracing::info!(
            plugin = %spec.name,
            repository = %spec.repository,
            version = %spec.version,
            "Building plugin from source"
        );
        self.store.ensure_dir()?;
        let staging = self.staging().map_err(|e| InstallError::Build {
            name: spec.name.clone(),
            source: BuildError::Workspace(e),
        })?;
        let staged = staging.path().join(crate::artifact::artifact_file_name(&spec.name));

        self.builder
            .build(spec, &staged)
            .map_err(|source| InstallError::Build {
                name: spec.name.clone(),
                source,
            })?;

        self.store.install_file(
            &spec.name,
            &staged,
            Origin::Source {
                repository: spec.repository.clone(),
                version: spec.version.clone(),
            },
        )?;
        tracing::info!(plugin = %spec.name, "Plugin installed");
        Ok(InstallOutcome::Installed)
    }

    /// Install every spec in order, continuing past failures
    pub fn check_and_install(&self, specs: &[PluginSpec]) -> InstallReport {
        let mut report = InstallReport::default();
        let mut seen = HashSet::new();

        for spec in specs {
            let result = if seen.insert(spec.name.as_str()) {
                self.install(spec)
            } else {
                Err(InstallError::DuplicateName {
                    name: spec.name.clone(),
                })
            };

            match result {
                Ok(InstallOutcome::Installed) => report.installed.push(spec.name.clone()),
                Ok(InstallOutcome::AlreadyInstalled) => report.skipped.push(spec.name.clone()),
                Err(error) => {
                    tracing::warn!(plugin = %spec.name, error = %error, "Plugin install failed");
                    report.failed.push(InstallFailure {
                        name: spec.name.clone(),
                        error,
                    });
                }
            }
        }
        report
    }
}
