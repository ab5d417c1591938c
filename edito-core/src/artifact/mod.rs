//! Compiled extension artifacts and the directory store that holds them
//!
//! An artifact is a `cdylib` produced by the build pipeline or downloaded
//! from the package registry. Installed plugins live in the [`ArtifactStore`]
//! as `<name>.<DLL_EXTENSION>` next to a `store.toml` describing where each
//! one came from.

mod store;

pub use store::{ArtifactRecord, ArtifactStore, Origin};
pub(crate) use store::check_name;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

/// Errors from the artifact store and artifact file handling
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid store metadata in {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    #[error("'{name}' is not a valid artifact name")]
    InvalidName { name: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// What an artifact contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Compiled configuration script
    Config,
    /// A plugin exporting `export_plugin!` entry points
    Plugin,
}

impl ArtifactKind {
    /// The symbol the loader looks up first
    pub fn entry_symbol(self) -> &'static str {
        match self {
            ArtifactKind::Config => "_edito_config_init",
            ArtifactKind::Plugin => "_edito_plugin_create",
        }
    }
}

/// A compiled, loadable native module
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    /// Source file the artifact was built from, if any
    pub source: Option<PathBuf>,
    /// Modification time of `source` when the build started
    pub source_modified: Option<SystemTime>,
}

impl Artifact {
    pub fn entry_symbol(&self) -> &'static str {
        self.kind.entry_symbol()
    }
}

/// Result of comparing a source file against its artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No artifact exists yet
    Missing,
    /// The source was modified after the artifact was written
    Stale,
    Fresh,
}

impl Freshness {
    pub fn needs_build(self) -> bool {
        !matches!(self, Freshness::Fresh)
    }
}

/// Compare modification times of a source file and its artifact.
///
/// Equal times count as fresh.
pub fn check_staleness(source: &Path, artifact: &Path) -> Result<Freshness, StoreError> {
    let artifact_modified = match std::fs::metadata(artifact) {
        Ok(meta) => meta.modified().map_err(|e| StoreError::io(artifact, e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Freshness::Missing),
        Err(e) => return Err(StoreError::io(artifact, e)),
    };
    let source_modified = modified_time(source)?;

    if source_modified > artifact_modified {
        Ok(Freshness::Stale)
    } else {
        Ok(Freshness::Fresh)
    }
}

pub(crate) fn modified_time(path: &Path) -> Result<SystemTime, StoreError> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| StoreError::io(path, e))
}

/// File name of an artifact called `name` on this platform, e.g. `file-tree.so`
pub fn artifact_file_name(name: &str) -> String {
    format!("{name}.{}", std::env::consts::DLL_EXTENSION)
}

/// Write `bytes` to `dest` through a temporary file in the same directory.
///
/// Readers never observe a partially written artifact.
pub fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = parent_dir(dest)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
    tmp.write_all(bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(dest).map_err(|e| StoreError::io(dest, e.error))?;
    Ok(())
}

/// Copy `src` over `dest` atomically.
pub fn copy_atomically(src: &Path, dest: &Path) -> Result<(), StoreError> {
    let dir = parent_dir(dest)?;
    let tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
    std::fs::copy(src, tmp.path()).map_err(|e| StoreError::io(src, e))?;
    tmp.persist(dest).map_err(|e| StoreError::io(dest, e.error))?;
    Ok(())
}

fn parent_dir(dest: &Path) -> Result<PathBuf, StoreError> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
    Ok(dir)
}
