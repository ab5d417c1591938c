//! Package registry client
//!
//! The registry serves a JSON catalog of prebuilt plugin artifacts at
//! `<url>/packages.json`. Installing a package downloads its artifact
//! straight into the [`ArtifactStore`]; no build step is involved.
//!
//! # Example
//!
//! ```ignore
//! use edito_core::registry::RegistryClient;
//!
//! let client = RegistryClient::new("https://packages.edito.dev", store);
//! client.refresh().await?;
//! for package in client.search("file") {
//!     println!("{} {}", package.name, package.version);
//! }
//! client.install("file-tree").await?;
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{ArtifactStore, Origin, StoreError};

/// Default package registry
pub const DEFAULT_REGISTRY_URL: &str = "https://packages.edito.dev";

const CATALOG_PATH: &str = "packages.json";

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Download location of the prebuilt artifact
    pub url: String,
    #[serde(default)]
    pub author: String,
}

impl PackageRecord {
    fn matches(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(query) || self.description.to_lowercase().contains(query)
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Registry returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid registry catalog: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Package '{name}' is not in the registry")]
    NotFound { name: String },

    #[error("Package '{name}' is not installed")]
    NotInstalled { name: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Client for a package registry, installing into an [`ArtifactStore`]
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
    store: ArtifactStore,
    catalog: RwLock<BTreeMap<String, PackageRecord>>,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, store: ArtifactStore) -> Self {
        Self::with_client(base_url, store, reqwest::Client::new())
    }

    pub fn with_client(
        base_url: impl Into<String>,
        store: ArtifactStore,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            store,
            catalog: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Fetch the catalog and replace the cached one.
    ///
    /// Returns the number of packages. For duplicate names in one payload
    /// the last entry wins.
    pub async fn refresh(&self) -> Result<usize, RegistryError> {
        let url = format!("{}/{CATALOG_PATH}", self.base_url);
        let bytes = self.get_bytes(&url).await?;
        let records: Vec<PackageRecord> = serde_json::from_slice(&bytes)?;

        let catalog: BTreeMap<String, PackageRecord> = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();
        let count = catalog.len();
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = catalog;

        tracing::info!(url = %url, packages = count, "Registry catalog refreshed");
        Ok(count)
    }

    /// Packages whose name or description contains `query`, ignoring case,
    /// sorted by name
    pub fn search(&self, query: &str) -> Vec<PackageRecord> {
        let query = query.to_lowercase();
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|record| record.matches(&query))
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<PackageRecord> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Every package in the cached catalog, sorted by name
    pub fn packages(&self) -> Vec<PackageRecord> {
        self.search("")
    }

    /// Download the artifact for `name` into the store
    pub async fn install(&self, name: &str) -> Result<PathBuf, RegistryError> {
        let record = self.get(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })?;

        tracing::info!(package = %name, version = %record.version, "Downloading package");
        let bytes = self.get_bytes(&record.url).await?;
        let path = self.store.install_bytes(
            name,
            &bytes,
            Origin::Registry {
                version: record.version.clone(),
            },
        )?;
        tracing::info!(package = %name, path = %path.display(), "Package installed");
        Ok(path)
    }

    /// Remove an installed package's artifact
    pub fn uninstall(&self, name: &str) -> Result<(), RegistryError> {
        if !self.store.remove(name)? {
            return Err(RegistryError::NotInstalled {
                name: name.to_string(),
            });
        }
        tracing::info!(package = %name, "Package uninstalled");
        Ok(())
    }

    /// Names of installed artifacts, sorted
    pub fn list_installed(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.store.list()?)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, RegistryError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
