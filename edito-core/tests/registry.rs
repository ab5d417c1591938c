//! Package registry round trip against a mock server

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edito_core::artifact::artifact_file_name;
use edito_core::{ArtifactStore, Origin, RegistryClient, RegistryError, StoreError};

async fn registry_with_packages() -> MockServer {
    let server = MockServer::start().await;
    let catalog = serde_json::json!([
        {
            "name": "file-tree",
            "version": "0.3.1",
            "description": "Directory browser in a side window",
            "url": format!("{}/artifacts/file-tree.bin", server.uri()),
            "author": "acme"
        },
        {
            "name": "git-gutter",
            "version": "1.0.0",
            "description": "Shows changed lines next to the text",
            "url": format!("{}/artifacts/git-gutter.bin", server.uri()),
            "author": "acme"
        }
    ]);
    Mock::given(method("GET"))
        .and(path("/packages.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/artifacts/file-tree.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x7fELF file-tree".to_vec()))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn search_install_uninstall_round_trip() {
    let server = registry_with_packages().await;
    let dir = TempDir::new().unwrap();
    let client = RegistryClient::new(server.uri(), ArtifactStore::new(dir.path().join("plugins")));

    assert_eq!(client.refresh().await.unwrap(), 2);
    let found: Vec<_> = client.search("file").into_iter().map(|p| p.name).collect();
    assert_eq!(found, vec!["file-tree"]);

    let installed = client.install("file-tree").await.unwrap();
    assert_eq!(std::fs::read(&installed).unwrap(), b"\x7fELF file-tree");
    assert_eq!(client.list_installed().unwrap(), vec!["file-tree"]);
    assert_eq!(
        client.store().record_for("file-tree").unwrap().unwrap().origin,
        Origin::Registry {
            version: "0.3.1".into()
        }
    );

    client.uninstall("file-tree").unwrap();
    assert!(client.list_installed().unwrap().is_empty());
    assert!(!installed.exists());
    assert!(client.store().record_for("file-tree").unwrap().is_none());
    // Still in the catalog
    assert!(client.get("file-tree").is_some());
}

#[tokio::test]
async fn failed_download_installs_nothing() {
    let server = registry_with_packages().await;
    let dir = TempDir::new().unwrap();
    let client = RegistryClient::new(server.uri(), ArtifactStore::new(dir.path().join("plugins")));
    client.refresh().await.unwrap();

    // No artifact mounted for git-gutter
    let err = client.install("git-gutter").await.unwrap_err();
    assert!(matches!(err, RegistryError::Status { status: 404, .. }));
    assert!(client.list_installed().unwrap().is_empty());
}

#[tokio::test]
async fn refresh_replaces_the_catalog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/packages.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "old-theme", "version": "1.0.0", "url": "http://x/old"}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/packages.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "new-theme", "version": "2.0.0", "url": "http://x/new"}
        ])))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = RegistryClient::new(server.uri(), ArtifactStore::new(dir.path()));

    client.refresh().await.unwrap();
    assert!(client.get("old-theme").is_some());

    client.refresh().await.unwrap();
    assert!(client.get("old-theme").is_none());
    let names: Vec<_> = client.packages().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["new-theme"]);
}

#[test]
fn uninstall_stays_inside_the_store() {
    let dir = TempDir::new().unwrap();
    let outside = dir.path().join(artifact_file_name("notes"));
    std::fs::write(&outside, b"keep").unwrap();
    let client = RegistryClient::new(
        "http://127.0.0.1:9",
        ArtifactStore::new(dir.path().join("plugins")),
    );

    let err = client.uninstall("../notes").unwrap_err();

    assert!(matches!(err, RegistryError::Store(StoreError::InvalidName { .. })));
    assert_eq!(std::fs::read(&outside).unwrap(), b"keep");
}
