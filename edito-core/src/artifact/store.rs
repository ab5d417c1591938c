//! Directory-backed store of installed plugin artifacts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use super::{StoreError, artifact_file_name, copy_atomically, write_atomically};

const METADATA_FILE: &str = "store.toml";

/// Where an installed artifact came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Origin {
    /// Downloaded prebuilt from the package registry
    Registry { version: String },
    /// Built from a git repository by the auto-installer
    Source { repository: String, version: String },
    /// Built from a plugin source file in the config directory
    Local { source: PathBuf },
}

/// Install metadata kept for each artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub installed_at: DateTime<Utc>,
    pub origin: Origin,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreMetadata {
    #[serde(default)]
    artifacts: BTreeMap<String, ArtifactRecord>,
}

/// The plugin artifact store, `<data>/plugins` by default
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store at the default XDG location
    pub fn open_default() -> Self {
        Self::new(edito_paths::plugin_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the artifact called `name` has (or would have). Names that
    /// would resolve outside the store are rejected.
    pub fn artifact_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        check_name(name)?;
        Ok(self.root.join(artifact_file_name(name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifact_path(name).is_ok_and(|path| path.is_file())
    }

    /// Create the store directory if needed
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))
    }

    /// Names of all installed artifacts, sorted.
    ///
    /// A missing store directory is an empty store.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.root, e))?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(std::env::consts::DLL_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write downloaded bytes as the artifact `name` and record its origin
    pub fn install_bytes(
        &self,
        name: &str,
        bytes: &[u8],
        origin: Origin,
    ) -> Result<PathBuf, StoreError> {
        let dest = self.artifact_path(name)?;
        write_atomically(&dest, bytes)?;
        self.record(name, origin)?;
        Ok(dest)
    }

    /// Copy a built artifact into the store as `name` and record its origin
    pub fn install_file(
        &self,
        name: &str,
        artifact: &Path,
        origin: Origin,
    ) -> Result<PathBuf, StoreError> {
        let dest = self.artifact_path(name)?;
        copy_atomically(artifact, &dest)?;
        self.record(name, origin)?;
        Ok(dest)
    }

    /// Remove an artifact and its record. Returns whether it existed.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.artifact_path(name)?;
        let existed = match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mut metadata = self.load_metadata()?;
        if metadata.artifacts.remove(name).is_some() {
            self.save_metadata(&metadata)?;
        }
        Ok(existed)
    }

    /// Install metadata for `name`, if recorded
    pub fn record_for(&self, name: &str) -> Result<Option<ArtifactRecord>, StoreError> {
        Ok(self.load_metadata()?.artifacts.remove(name))
    }

    /// Record the origin of an artifact already in place
    pub fn record(&self, name: &str, origin: Origin) -> Result<(), StoreError> {
        check_name(name)?;
        let mut metadata = self.load_metadata()?;
        metadata.artifacts.insert(
            name.to_string(),
            ArtifactRecord {
                installed_at: Utc::now(),
                origin,
            },
        );
        self.save_metadata(&metadata)
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    fn load_metadata(&self) -> Result<StoreMetadata, StoreError> {
        let path = self.metadata_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreMetadata::default());
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        toml::from_str(&content).map_err(|e| StoreError::Metadata {
            path,
            message: e.to_string(),
        })
    }

    fn save_metadata(&self, metadata: &StoreMetadata) -> Result<(), StoreError> {
        let path = self.metadata_path();
        let content = toml::to_string_pretty(metadata).map_err(|e| StoreError::Metadata {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_atomically(&path, content.as_bytes())
    }
}

/// A name must be a single plain path component
pub(crate) fn check_name(name: &str) -> Result<(), StoreError> {
    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    );
    if plain && !name.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_origin() -> Origin {
        Origin::Registry {
            version: "1.2.0".to_string(),
        }
    }

    #[test]
    fn test_missing_store_lists_nothing() {
        let store = ArtifactStore::new("/nonexistent/edito/plugins");
        assert!(store.list().unwrap().is_empty());
        assert!(!store.contains("anything"));
    }

    #[test]
    fn test_install_and_list_sorted() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.install_bytes("zeta", b"z", registry_origin()).unwrap();
        store.install_bytes("alpha", b"a", registry_origin()).unwrap();

        assert_eq!(store.list().unwrap(), vec!["alpha", "zeta"]);
        assert!(store.contains("alpha"));
    }

    #[test]
    fn test_list_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.install_bytes("real", b"x", registry_origin()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join(artifact_file_name("dir"))).unwrap();

        // store.toml is present too and must not be listed
        assert_eq!(store.list().unwrap(), vec!["real"]);
    }

    #[test]
    fn test_records_roundtrip_through_toml() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let source_origin = Origin::Source {
            repository: "https://github.com/acme/edito-file-tree".to_string(),
            version: "v0.1.0".to_string(),
        };

        store.install_bytes("file-tree", b"x", source_origin.clone()).unwrap();
        store.install_bytes("theme", b"y", registry_origin()).unwrap();

        let record = store.record_for("file-tree").unwrap().unwrap();
        assert_eq!(record.origin, source_origin);
        assert_eq!(store.record_for("theme").unwrap().unwrap().origin, registry_origin());
        assert!(store.record_for("missing").unwrap().is_none());
    }

    #[test]
    fn test_install_file_copies() {
        let dir = TempDir::new().unwrap();
        let built = dir.path().join("libedito_extension.so");
        std::fs::write(&built, b"binary").unwrap();
        let store = ArtifactStore::new(dir.path().join("store"));

        let path = store
            .install_file(
                "local",
                &built,
                Origin::Local {
                    source: PathBuf::from("/home/me/.config/edito/plugins/local.rs"),
                },
            )
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"binary");
        assert!(built.exists());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.install_bytes("gone", b"x", registry_origin()).unwrap();

        assert!(store.remove("gone").unwrap());
        assert!(!store.contains("gone"));
        assert!(store.record_for("gone").unwrap().is_none());
        assert!(!store.remove("gone").unwrap());
    }

    #[test]
    fn test_names_outside_the_store_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("store"));
        let outside = dir.path().join(artifact_file_name("victim"));
        std::fs::write(&outside, b"keep").unwrap();

        for name in ["../victim", "..", ".", "", "a/b", "a\\b", "/etc/passwd", "victim/"] {
            assert!(
                matches!(store.artifact_path(name), Err(StoreError::InvalidName { .. })),
                "{name:?} accepted"
            );
            assert!(!store.contains(name));
        }
        assert!(matches!(store.remove("../victim"), Err(StoreError::InvalidName { .. })));
        assert!(store.install_bytes("../victim", b"x", registry_origin()).is_err());
        assert!(store.record("../victim", registry_origin()).is_err());
        assert_eq!(std::fs::read(&outside).unwrap(), b"keep");

        assert!(store.artifact_path("file-tree.v2").is_ok());
    }

    #[test]
    fn test_corrupt_metadata_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), "not = [valid").unwrap();
        let store = ArtifactStore::new(dir.path());

        let err = store.record_for("x").unwrap_err();
        assert!(matches!(err, StoreError::Metadata { .. }));
    }
}
