//! Build pipeline: source files to loadable native artifacts
//!
//! Every build runs in its own [`BuildWorkspace`], a throwaway cargo project
//! with a private target directory, so an extension's dependency graph never
//! meets the host's. The compiled library is copied atomically to the
//! requested output path and the workspace is deleted.

mod source;
mod workspace;

pub use source::{scan_dependencies, strip_crate_attributes, synthesize_lib};
pub use workspace::{BuildWorkspace, LIB_NAME};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{
    Artifact, ArtifactKind, Freshness, StoreError, check_staleness, copy_atomically,
    modified_time,
};

/// Package name of the plugin API crate in generated manifests
pub const API_PACKAGE: &str = "edito-plugin-api";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to create build workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Failed to run {program}: {source}")]
    Toolchain {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve dependencies:\n{output}")]
    Dependencies { output: String },

    #[error("Compilation failed ({status}):\n{output}")]
    Compile { status: ExitStatus, output: String },

    #[error("Build succeeded but produced no artifact at {0}")]
    MissingArtifact(PathBuf),

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Invalid source pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Toolchain settings shared by every build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Cargo executable
    pub cargo: PathBuf,
    pub release: bool,
    /// Pass `--offline` to cargo
    pub offline: bool,
    /// Dependency specification for the plugin API crate
    pub api_dependency: toml::Value,
    /// Parent directory for build workspaces, the system temp dir if unset
    pub work_dir: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            cargo: PathBuf::from("cargo"),
            release: true,
            offline: false,
            api_dependency: default_api_dependency(),
            work_dir: None,
        }
    }
}

/// The plugin API crate this host was built with, pinned to its exact
/// version and taken from its source directory while that still exists.
pub fn default_api_dependency() -> toml::Value {
    api_dependency_at(Path::new(edito_plugin_api::CRATE_DIR))
}

fn api_dependency_at(dir: &Path) -> toml::Value {
    let mut table = toml::Table::new();
    table.insert(
        "version".to_string(),
        toml::Value::String(format!("={}", edito_plugin_api::CRATE_VERSION)),
    );
    if dir.join("Cargo.toml").is_file() {
        table.insert(
            "path".to_string(),
            toml::Value::String(dir.display().to_string()),
        );
    } else {
        tracing::debug!(
            dir = %dir.display(),
            "Plugin API sources not found, extensions resolve it from the registry"
        );
    }
    toml::Value::Table(table)
}

impl BuildOptions {
    pub fn profile(&self) -> &'static str {
        if self.release { "release" } else { "debug" }
    }
}

/// One source file to compile
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub source: PathBuf,
    pub output: PathBuf,
    pub kind: ArtifactKind,
}

impl BuildRequest {
    pub fn config(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            kind: ArtifactKind::Config,
        }
    }

    pub fn plugin(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            kind: ArtifactKind::Plugin,
        }
    }
}

/// A crate root and its dependencies, ready to build
#[derive(Debug, Clone, PartialEq)]
pub struct LibrarySource {
    pub lib_rs: String,
    pub dependencies: BTreeMap<String, toml::Value>,
}

/// What [`BuildPipeline::ensure_fresh`] did
#[derive(Debug, Clone, PartialEq)]
pub enum BuildAction {
    UpToDate,
    Rebuilt,
    /// The rebuild failed and the previous artifact was kept
    FellBack { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Freshened {
    pub artifact: Artifact,
    pub action: BuildAction,
}

/// Compiles extension sources with cargo.
///
/// There is no internal locking; callers must not build two requests with
/// the same output path at once.
#[derive(Debug, Clone, Default)]
pub struct BuildPipeline {
    options: BuildOptions,
}

impl BuildPipeline {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Compile `request.source` into `request.output`.
    pub fn compile(&self, request: &BuildRequest) -> Result<Artifact, BuildError> {
        let source_modified = modified_time(&request.source)?;
        let text = std::fs::read_to_string(&request.source)
            .map_err(|e| BuildError::io(&request.source, e))?;

        let mut dependencies: BTreeMap<String, toml::Value> = scan_dependencies(&text)?
            .into_iter()
            .map(|name| (name, toml::Value::String("*".to_string())))
            .collect();
        dependencies.insert(API_PACKAGE.to_string(), self.options.api_dependency.clone());

        let library = LibrarySource {
            lib_rs: synthesize_lib(&request.source, &text, request.kind)?,
            dependencies,
        };

        tracing::info!(
            source = %request.source.display(),
            kind = ?request.kind,
            "Compiling extension"
        );
        self.build_library(&library, &request.output)?;

        Ok(Artifact {
            path: request.output.clone(),
            kind: request.kind,
            source: Some(request.source.clone()),
            source_modified: Some(source_modified),
        })
    }

    /// Build `library` in a fresh workspace and copy the result to `output`.
    pub fn build_library(&self, library: &LibrarySource, output: &Path) -> Result<(), BuildError> {
        let workspace = BuildWorkspace::create(self.options.work_dir.as_deref())?;
        workspace.write_manifest(&library.dependencies)?;
        workspace.write_lib(&library.lib_rs)?;

        let fetch = self.run_cargo(&workspace, &["fetch"])?;
        if !fetch.status.success() {
            return Err(BuildError::Dependencies {
                output: fetch.output,
            });
        }

        let mut args = vec!["build", "--lib"];
        if self.options.release {
            args.push("--release");
        }
        if self.options.offline {
            args.push("--offline");
        }
        let build = self.run_cargo(&workspace, &args)?;
        if !build.status.success() {
            return Err(BuildError::Compile {
                status: build.status,
                output: build.output,
            });
        }

        let built = workspace.output_path(self.options.profile());
        if !built.is_file() {
            return Err(BuildError::MissingArtifact(built));
        }
        copy_atomically(&built, output)?;
        tracing::debug!(output = %output.display(), "Artifact written");
        Ok(())
    }

    /// Rebuild `request` when its artifact is missing or stale.
    ///
    /// When a rebuild fails and an older artifact exists, that artifact is
    /// returned instead of the error.
    pub fn ensure_fresh(&self, request: &BuildRequest) -> Result<Freshened, BuildError> {
        let freshness = check_staleness(&request.source, &request.output)?;
        if freshness == Freshness::Fresh {
            tracing::debug!(source = %request.source.display(), "Artifact up to date");
            return Ok(Freshened {
                artifact: Artifact {
                    path: request.output.clone(),
                    kind: request.kind,
                    source: Some(request.source.clone()),
                    source_modified: modified_time(&request.source).ok(),
                },
                action: BuildAction::UpToDate,
            });
        }

        match self.compile(request) {
            Ok(artifact) => Ok(Freshened {
                artifact,
                action: BuildAction::Rebuilt,
            }),
            Err(e) if freshness == Freshness::Stale => {
                tracing::warn!(
                    source = %request.source.display(),
                    error = %e,
                    "Rebuild failed, using previous artifact"
                );
                Ok(Freshened {
                    artifact: Artifact {
                        path: request.output.clone(),
                        kind: request.kind,
                        source: Some(request.source.clone()),
                        source_modified: None,
                    },
                    action: BuildAction::FellBack {
                        reason: e.to_string(),
                    },
                })
            }
            Err(e) => Err(e),
        }
    }

    fn run_cargo(&self, workspace: &BuildWorkspace, args: &[&str]) -> Result<CargoOutput, BuildError> {
        tracing::debug!(args = ?args, workspace = %workspace.root().display(), "Running cargo");
        let output = Command::new(&self.options.cargo)
            .args(args)
            .current_dir(workspace.root())
            .env("CARGO_TARGET_DIR", workspace.target_dir())
            .output()
            .map_err(|source| BuildError::Toolchain {
                program: self.options.cargo.display().to_string(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CargoOutput {
            status: output.status,
            output: combined,
        })
    }
}

struct CargoOutput {
    status: ExitStatus,
    output: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_options() {
        let options = BuildOptions::default();
        assert_eq!(options.cargo, PathBuf::from("cargo"));
        assert_eq!(options.profile(), "release");
        assert!(!options.offline);
        assert!(options.work_dir.is_none());
    }

    #[test]
    fn test_default_api_dependency_is_the_host_crate() {
        let dependency = default_api_dependency();
        let pinned = format!("={}", edito_plugin_api::CRATE_VERSION);
        assert_eq!(dependency["version"].as_str(), Some(pinned.as_str()));

        let dir = PathBuf::from(dependency["path"].as_str().unwrap());
        let manifest: toml::Table =
            toml::from_str(&std::fs::read_to_string(dir.join("Cargo.toml")).unwrap()).unwrap();
        assert_eq!(manifest["package"]["name"].as_str(), Some(API_PACKAGE));
        assert_eq!(env!("CARGO_PKG_VERSION"), edito_plugin_api::CRATE_VERSION);
    }

    #[test]
    fn test_api_dependency_without_sources_is_version_only() {
        let dir = TempDir::new().unwrap();
        let dependency = api_dependency_at(dir.path());
        let table = dependency.as_table().unwrap();
        assert!(!table.contains_key("path"));
        assert!(table["version"].as_str().unwrap().starts_with('='));
    }

    #[test]
    fn test_missing_toolchain_cleans_workspace() {
        let dir = TempDir::new().unwrap();
        let work_dir = dir.path().join("work");
        let source = dir.path().join("config.rs");
        std::fs::write(&source, "pub fn init(editor: &mut ConfigEditor) {}").unwrap();

        let pipeline = BuildPipeline::new(BuildOptions {
            cargo: dir.path().join("no-such-cargo"),
            work_dir: Some(work_dir.clone()),
            ..Default::default()
        });
        let request = BuildRequest::config(&source, dir.path().join("config.so"));

        let err = pipeline.compile(&request).unwrap_err();
        assert!(matches!(err, BuildError::Toolchain { .. }), "{err}");
        assert_eq!(std::fs::read_dir(&work_dir).unwrap().count(), 0);
        assert!(!request.output.exists());
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = BuildPipeline::default();
        let request = BuildRequest::plugin(dir.path().join("gone.rs"), dir.path().join("gone.so"));
        assert!(pipeline.compile(&request).is_err());
        assert!(pipeline.ensure_fresh(&request).is_err());
    }
}
