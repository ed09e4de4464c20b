//! Rollback manager.
//!
//! A rollback archive is a snapshot of the whole project tree (minus the
//! preserve list) taken right before a destructive replace. At most one
//! exists at a time; restoring consumes it. The same restore primitive
//! backs both the `rollback` operation and the install failure recovery.

use crate::archive;
use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::fs_tree;
use crate::install::run_dependency_installer;
use crate::layout::StateLayout;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Metadata for the rollback archive, persisted as `rollback.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackInfo {
    /// The version that was current when the snapshot was taken.
    pub version: Version,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub restored_version: Version,
}

pub struct RollbackManager {
    config: UpdateConfig,
    layout: StateLayout,
}

impl RollbackManager {
    pub fn new(config: UpdateConfig, layout: StateLayout) -> Self {
        Self { config, layout }
    }

    /// Read-only inspection of the rollback archive. Never mutates; valid in
    /// any engine state. Absent when no archive exists on disk.
    pub fn info(&self) -> Option<RollbackInfo> {
        let raw = fs::read_to_string(self.layout.rollback_record_file()).ok()?;
        let info: RollbackInfo = match serde_json::from_str(&raw) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "corrupt rollback record; treating as absent");
                return None;
            }
        };
        info.path.is_file().then_some(info)
    }

    /// Snapshot the project tree, overwriting any previous archive.
    pub(crate) fn create_archive(&self, version: Version) -> Result<RollbackInfo> {
        let dir = self.layout.rollback_dir();
        fs::create_dir_all(&dir)?;
        // Only one archive may exist; drop whatever a previous install left.
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            fs::remove_file(entry.path())?;
        }

        let path = dir.join(format!("rollback-{version}.zip"));
        let exclude = self.config.preserve_set();
        if let Err(e) = archive::pack_dir(&self.config.project_root, &path, &exclude) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        let info = RollbackInfo {
            version,
            size_bytes: fs::metadata(&path)?.len(),
            path,
            created_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&info)
            .map_err(|e| UpdateError::FileSystem(e.to_string()))?;
        fs::write(self.layout.rollback_record_file(), content)?;
        info!(version = %info.version, bytes = info.size_bytes, "rollback archive created");
        Ok(info)
    }

    /// Restore the project tree from the archive and consume it.
    ///
    /// Idempotence contract: once an invocation has consumed the archive, the
    /// next one fails with [`UpdateError::NoRollbackAvailable`] without
    /// touching anything.
    pub(crate) async fn restore(&self) -> Result<Version> {
        let info = self.info().ok_or(UpdateError::NoRollbackAvailable)?;
        info!(version = %info.version, "restoring project tree from rollback archive");

        let preserve = self.config.preserve_set();
        fs_tree::remove_children_except(&self.config.project_root, &preserve)?;
        archive::unpack(&info.path, &self.config.project_root)?;
        run_dependency_installer(&self.config.install_command, &self.config.project_root).await?;

        // Consumed only after a complete restore, so a failed attempt can be
        // retried from the same archive.
        fs::remove_file(&info.path)?;
        if let Err(e) = fs::remove_file(self.layout.rollback_record_file()) {
            warn!(error = %e, "failed to remove rollback record");
        }
        info!(version = %info.version, "project tree restored");
        Ok(info.version)
    }

    /// Delete the archive without restoring. Returns whether one existed.
    pub(crate) fn clear(&self) -> Result<bool> {
        let existed = self.info().is_some();
        let dir = self.layout.rollback_dir();
        if dir.exists() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                fs::remove_file(entry.path())?;
            }
        }
        Ok(existed)
    }
}
