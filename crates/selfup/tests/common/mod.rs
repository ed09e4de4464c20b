#![allow(dead_code)]

//! Shared fixtures: a throwaway project tree, an in-memory release source,
//! and tree-snapshot helpers.

use async_trait::async_trait;
use selfup::{Release, ReleaseAsset, ReleaseSource, UpdateConfig, UpdateError};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;
use walkdir::WalkDir;

/// A temp project tree: manifest, an entry file, an env file, and a fake
/// version-control directory.
pub struct TestProject {
    pub dir: tempfile::TempDir,
}

impl TestProject {
    pub fn new(version: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("package.json"),
            format!(r#"{{"name": "demo-app", "version": "{version}"}}"#),
        )
        .unwrap();
        fs::write(root.join("index.js"), format!("// demo-app {version}\n")).unwrap();
        fs::write(root.join(".env"), "API_KEY=secret\n").unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn manifest_version(&self) -> String {
        let raw = fs::read_to_string(self.root().join("package.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["version"].as_str().unwrap().to_string()
    }
}

/// Engine config against the test project, with a no-op dependency installer.
pub fn test_config(root: &Path) -> UpdateConfig {
    let mut config = UpdateConfig::new("acme", "demo-app", root);
    config.install_command = vec!["true".to_string()];
    config
}

/// Build a zip holding the given (path, contents) files, as a release asset
/// would ship them.
pub fn release_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("tree");
    for (path, contents) in files {
        let dest = tree.join(path);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(dest, contents).unwrap();
    }
    let archive = dir.path().join("asset.zip");
    selfup::archive::pack_dir(&tree, &archive, &Default::default()).unwrap();
    fs::read(archive).unwrap()
}

/// A published release with zero or one asset.
pub fn release(tag: &str, body: &str, asset_name: Option<&str>) -> Release {
    Release {
        tag_name: tag.to_string(),
        name: tag.to_string(),
        body: body.to_string(),
        prerelease: false,
        published_at: None,
        assets: asset_name
            .map(|name| {
                vec![ReleaseAsset {
                    name: name.to_string(),
                    download_url: format!("https://example.invalid/{name}"),
                    size: 0,
                }]
            })
            .unwrap_or_default(),
    }
}

/// In-memory release source: fixed release list, assets served by name.
pub struct FixedSource {
    pub releases: Vec<Release>,
    pub assets: HashMap<String, Vec<u8>>,
}

impl FixedSource {
    pub fn new(releases: Vec<Release>) -> Self {
        Self {
            releases,
            assets: HashMap::new(),
        }
    }

    pub fn with_asset(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.assets.insert(name.to_string(), bytes);
        self
    }
}

#[async_trait]
impl ReleaseSource for FixedSource {
    async fn list_releases(&self) -> selfup::Result<Vec<Release>> {
        Ok(self.releases.clone())
    }

    async fn fetch_asset(&self, asset: &ReleaseAsset) -> selfup::Result<Vec<u8>> {
        self.assets.get(&asset.name).cloned().ok_or_else(|| {
            UpdateError::Network {
                message: format!("no such asset {}", asset.name),
                status: Some(404),
            }
        })
    }
}

/// A source whose asset fetch stalls, to hold the engine in `downloading`.
pub struct StallSource {
    pub inner: FixedSource,
    pub delay: Duration,
}

#[async_trait]
impl ReleaseSource for StallSource {
    async fn list_releases(&self) -> selfup::Result<Vec<Release>> {
        self.inner.list_releases().await
    }

    async fn fetch_asset(&self, asset: &ReleaseAsset) -> selfup::Result<Vec<u8>> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_asset(asset).await
    }
}

/// Snapshot of every file under `root` (relative path -> contents), skipping
/// the engine's state directory.
pub fn file_set(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || e.file_name() != ".selfup");
    for entry in walker {
        let entry = entry.unwrap();
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            files.insert(rel, fs::read(entry.path()).unwrap());
        }
    }
    files
}
