//! On-disk layout of the engine's internal state directory.
//!
//! The state directory lives inside the project root, is always on the
//! preserve list, and holds three subtrees plus the JSON state files:
//!
//! ```text
//! <state dir>/
//!     downloads/      cached release asset (one at a time) + download.json
//!     backups/        timestamped backup directories
//!     rollback/       at most one rollback archive + rollback.json
//!     staging/        scratch area while an install is extracting
//!     history.json    last-operation record
//! ```

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

pub const DOWNLOAD_RECORD_FILE: &str = "download.json";
pub const ROLLBACK_RECORD_FILE: &str = "rollback.json";
pub const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn rollback_dir(&self) -> PathBuf {
        self.root.join("rollback")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    pub fn download_record_file(&self) -> PathBuf {
        self.downloads_dir().join(DOWNLOAD_RECORD_FILE)
    }

    pub fn rollback_record_file(&self) -> PathBuf {
        self.rollback_dir().join(ROLLBACK_RECORD_FILE)
    }

    pub fn history_file(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }

    /// Create the directory tree if missing.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(self.downloads_dir())?;
        fs::create_dir_all(self.backups_dir())?;
        fs::create_dir_all(self.rollback_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_creates_the_subtrees() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path().join(".selfup"));
        layout.ensure().unwrap();
        assert!(layout.downloads_dir().is_dir());
        assert!(layout.backups_dir().is_dir());
        assert!(layout.rollback_dir().is_dir());
    }
}
