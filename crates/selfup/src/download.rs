//! Download manager.
//!
//! Fetches the resolved target's asset into the cache directory. At most one
//! cached download exists at a time; a new download replaces the prior one.
//! The fetch is atomic on disk: bytes land under a `.partial` name and are
//! renamed only when complete, so a failed fetch leaves no partial archive.

use crate::error::{Result, UpdateError};
use crate::github_releases::{ReleaseAsset, ReleaseSource};
use crate::layout::{StateLayout, DOWNLOAD_RECORD_FILE};
use crate::resolver::UpgradePlan;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A completed download, persisted as `download.json` next to the archive.
/// Consumed by a successful install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub version: Version,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub downloaded_at: DateTime<Utc>,
}

/// What `download` reports back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub version: Version,
    pub size_bytes: u64,
    pub path: PathBuf,
    /// Target equals the latest release.
    pub is_latest: bool,
    /// A stepping-stone (non-latest) version was fetched.
    pub is_intermediate: bool,
}

pub struct DownloadManager {
    layout: StateLayout,
    asset_pattern: Option<String>,
}

impl DownloadManager {
    pub fn new(layout: StateLayout, asset_pattern: Option<String>) -> Self {
        Self {
            layout,
            asset_pattern,
        }
    }

    /// The active download record, if the archive it points at still exists.
    pub fn current(&self) -> Option<DownloadRecord> {
        let raw = fs::read_to_string(self.layout.download_record_file()).ok()?;
        let record: DownloadRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "corrupt download record; treating as absent");
                return None;
            }
        };
        record.path.is_file().then_some(record)
    }

    /// Fetch the plan's target asset into the cache, replacing any prior
    /// cached download.
    pub async fn download(
        &self,
        source: &dyn ReleaseSource,
        plan: &UpgradePlan,
    ) -> Result<DownloadRecord> {
        let asset = self.select_asset(plan)?;
        info!(version = %plan.target_version, asset = %asset.name, "downloading release asset");

        let bytes = source.fetch_asset(asset).await?;
        if bytes.is_empty() {
            return Err(UpdateError::Network {
                message: format!("asset {} downloaded empty", asset.name),
                status: None,
            });
        }

        let dir = self.layout.downloads_dir();
        fs::create_dir_all(&dir)?;
        let tmp_path = dir.join(format!("{}.partial", asset.name));
        let final_path = dir.join(&asset.name);

        if let Err(e) = fs::write(&tmp_path, &bytes) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        self.clear_cache_except(&tmp_path)?;
        fs::rename(&tmp_path, &final_path)?;

        let record = DownloadRecord {
            version: plan.target_version,
            path: final_path,
            size_bytes: bytes.len() as u64,
            sha256: sha256_hex(&bytes),
            downloaded_at: Utc::now(),
        };
        self.save_record(&record)?;
        info!(version = %record.version, bytes = record.size_bytes, "download complete");
        Ok(record)
    }

    /// Re-verify a cached archive against its recorded checksum.
    pub fn verify(&self, record: &DownloadRecord) -> Result<()> {
        let actual = sha256_file(&record.path)?;
        if actual != record.sha256 {
            return Err(UpdateError::DownloadMissing(format!(
                "cached download for {} failed its integrity check",
                record.version
            )));
        }
        Ok(())
    }

    /// Invalidate the record after a successful install.
    pub fn consume(&self, record: &DownloadRecord) -> Result<()> {
        if record.path.exists() {
            fs::remove_file(&record.path)?;
        }
        let record_file = self.layout.download_record_file();
        if record_file.exists() {
            fs::remove_file(record_file)?;
        }
        Ok(())
    }

    /// Empty the cache directory. Returns the number of archives removed.
    pub fn clear(&self) -> Result<usize> {
        let dir = self.layout.downloads_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let is_record = entry.file_name() == DOWNLOAD_RECORD_FILE;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
            if !is_record {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn select_asset<'a>(&self, plan: &'a UpgradePlan) -> Result<&'a ReleaseAsset> {
        let release = &plan.target_release;
        match &self.asset_pattern {
            Some(pattern) => release.find_asset(pattern).ok_or_else(|| {
                UpdateError::Resolution(format!(
                    "release {} has no asset matching {pattern:?}",
                    release.tag_name
                ))
            }),
            None => release.assets.first().ok_or_else(|| {
                UpdateError::Resolution(format!("release {} has no assets", release.tag_name))
            }),
        }
    }

    fn clear_cache_except(&self, keep: &Path) -> Result<()> {
        for entry in fs::read_dir(self.layout.downloads_dir())? {
            let entry = entry?;
            if entry.path() == keep {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn save_record(&self, record: &DownloadRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| UpdateError::FileSystem(e.to_string()))?;
        fs::write(self.layout.download_record_file(), content)?;
        Ok(())
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
