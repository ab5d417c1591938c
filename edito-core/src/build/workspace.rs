//! Disposable cargo workspaces, one per build

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;

use super::BuildError;

/// Library name of every generated crate
pub const LIB_NAME: &str = "edito_extension";

const PACKAGE_NAME: &str = "edito-extension";

#[derive(Serialize)]
struct Manifest<'a> {
    package: Package<'a>,
    lib: Lib<'a>,
    dependencies: &'a BTreeMap<String, toml::Value>,
    /// Empty table: the crate is its own workspace root
    workspace: toml::Table,
}

#[derive(Serialize)]
struct Package<'a> {
    name: &'a str,
    version: &'a str,
    edition: &'a str,
    publish: bool,
}

#[derive(Serialize)]
struct Lib<'a> {
    name: &'a str,
    path: &'a str,
    #[serde(rename = "crate-type")]
    crate_type: Vec<&'a str>,
}

/// An isolated cargo project in a temporary directory.
///
/// The directory is removed when the workspace is dropped, whether or not
/// the build succeeded.
#[derive(Debug)]
pub struct BuildWorkspace {
    dir: TempDir,
}

impl BuildWorkspace {
    /// Create a workspace under `parent`, or the system temp dir
    pub fn create(parent: Option<&Path>) -> Result<Self, BuildError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("edito-build-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(BuildError::Workspace)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(BuildError::Workspace)?;
        tracing::debug!(path = %dir.path().display(), "Created build workspace");
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Target directory private to this workspace
    pub fn target_dir(&self) -> PathBuf {
        self.root().join("target")
    }

    /// Where cargo leaves the compiled library for `profile`
    pub fn output_path(&self, profile: &str) -> PathBuf {
        self.target_dir().join(profile).join(format!(
            "{}{LIB_NAME}.{}",
            std::env::consts::DLL_PREFIX,
            std::env::consts::DLL_EXTENSION
        ))
    }

    /// Write `Cargo.toml` declaring a `cdylib` with `dependencies`
    pub fn write_manifest(
        &self,
        dependencies: &BTreeMap<String, toml::Value>,
    ) -> Result<(), BuildError> {
        let content = render_manifest(dependencies)?;
        self.write(Path::new("Cargo.toml"), &content)
    }

    /// Write the crate root
    pub fn write_lib(&self, content: &str) -> Result<(), BuildError> {
        self.write(Path::new("src/lib.rs"), content)
    }

    fn write(&self, relative: &Path, content: &str) -> Result<(), BuildError> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        std::fs::write(&path, content).map_err(|e| BuildError::io(&path, e))
    }
}

fn render_manifest(dependencies: &BTreeMap<String, toml::Value>) -> Result<String, BuildError> {
    let manifest = Manifest {
        package: Package {
            name: PACKAGE_NAME,
            version: "0.0.0",
            edition: "2024",
            publish: false,
        },
        lib: Lib {
            name: LIB_NAME,
            path: "src/lib.rs",
            crate_type: vec!["cdylib"],
        },
        dependencies,
        workspace: toml::Table::new(),
    };
    toml::to_string(&manifest).map_err(|e| BuildError::Manifest(e.to_string()))
}
