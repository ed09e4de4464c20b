//! Persisted record of the engine's most recent operations.
//!
//! Best-effort: recording never fails an operation. State file:
//! `<state dir>/history.json`.

use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    UpToDate,
    UpdateAvailable { current: Version, target: Version },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub at: DateTime<Utc>,
    pub outcome: CheckOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRecord {
    pub at: DateTime<Utc>,
    pub from_version: Version,
    pub to_version: Version,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub at: DateTime<Utc>,
    pub restored_version: Option<Version>,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateHistory {
    pub last_check: Option<CheckRecord>,
    pub last_install: Option<InstallRecord>,
    pub last_rollback: Option<RollbackRecord>,
}

pub struct HistoryStore {
    file: PathBuf,
}

impl HistoryStore {
    pub fn new(file: PathBuf) -> Self {
        Self { file }
    }

    /// Load from disk; a missing or corrupt file reads as empty.
    pub fn load(&self) -> UpdateHistory {
        match fs::read_to_string(&self.file) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => UpdateHistory::default(),
        }
    }

    pub fn record_check(&self, outcome: CheckOutcome) {
        let mut history = self.load();
        history.last_check = Some(CheckRecord {
            at: Utc::now(),
            outcome,
        });
        self.save(&history);
    }

    pub fn record_install(&self, record: InstallRecord) {
        let mut history = self.load();
        history.last_install = Some(record);
        self.save(&history);
    }

    pub fn record_rollback(&self, record: RollbackRecord) {
        let mut history = self.load();
        history.last_rollback = Some(record);
        self.save(&history);
    }

    fn save(&self, history: &UpdateHistory) {
        let content = match serde_json::to_string_pretty(history) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "failed to serialize update history");
                return;
            }
        };
        if let Err(e) = fs::write(&self.file, content) {
            warn!(error = %e, "failed to persist update history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        assert!(store.load().last_check.is_none());

        store.record_check(CheckOutcome::UpdateAvailable {
            current: Version::new(1, 0, 0),
            target: Version::new(2, 0, 0),
        });
        store.record_install(InstallRecord {
            at: Utc::now(),
            from_version: Version::new(1, 0, 0),
            to_version: Version::new(2, 0, 0),
            success: true,
            error: None,
        });

        let history = store.load();
        assert!(matches!(
            history.last_check.unwrap().outcome,
            CheckOutcome::UpdateAvailable { .. }
        ));
        assert!(history.last_install.unwrap().success);
        assert!(history.last_rollback.is_none());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("history.json");
        fs::write(&file, "not json").unwrap();
        let store = HistoryStore::new(file);
        assert!(store.load().last_check.is_none());
    }
}
