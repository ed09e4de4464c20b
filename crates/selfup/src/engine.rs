//! Update lifecycle engine facade.
//!
//! Wires the resolver, state machine, and managers together behind the
//! operation surface: `check`, `download`, `install`, `rollback`, the two
//! synchronous inspections, and the maintenance operations. One engine per
//! process: the constructor claims a process-wide slot, released when the
//! engine drops (normally at process exit).

use crate::config::UpdateConfig;
use crate::download::{DownloadManager, DownloadOutcome};
use crate::error::{Result, UpdateError};
use crate::github_releases::{GitHubClient, ReleaseSource};
use crate::history::{CheckOutcome, HistoryStore, InstallRecord, RollbackRecord, UpdateHistory};
use crate::install::{InstallManager, InstallOutcome};
use crate::layout::StateLayout;
use crate::manifest;
use crate::op_state::{EngineState, Operation, OperationStateMachine};
use crate::resolver::{self, UpgradePlan};
use crate::rollback::{RollbackInfo, RollbackManager, RollbackOutcome};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Claimed by the live engine; a second construction fails until it drops.
static ENGINE_SLOT: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Serialize)]
pub struct ClearBackupsOutcome {
    pub backups_removed: usize,
    /// True when the rollback archive was removed too: rolling back is no
    /// longer possible.
    pub rollback_removed: bool,
}

pub struct UpdateEngine {
    config: UpdateConfig,
    layout: StateLayout,
    machine: OperationStateMachine,
    source: Box<dyn ReleaseSource>,
    downloads: DownloadManager,
    installer: InstallManager,
    rollback: RollbackManager,
    history: HistoryStore,
    /// Plan from the most recent successful `check` in this session.
    plan: Mutex<Option<UpgradePlan>>,
}

impl std::fmt::Debug for UpdateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateEngine").finish_non_exhaustive()
    }
}

impl UpdateEngine {
    /// Construct against the GitHub release source named in the config.
    pub fn new(config: UpdateConfig) -> Result<Self> {
        let source = Box::new(GitHubClient::new(
            config.repo_owner.clone(),
            config.repo_name.clone(),
            config.auth_token.clone(),
        ));
        Self::with_source(config, source)
    }

    /// Construct against an arbitrary release source.
    pub fn with_source(config: UpdateConfig, source: Box<dyn ReleaseSource>) -> Result<Self> {
        config.validate()?;
        if ENGINE_SLOT
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UpdateError::Config(
                "an update engine is already active in this process".to_string(),
            ));
        }

        let layout = StateLayout::new(config.state_dir_path());
        if let Err(e) = layout.ensure() {
            ENGINE_SLOT.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let downloads = DownloadManager::new(layout.clone(), config.asset_pattern.clone());
        let installer = InstallManager::new(config.clone(), layout.clone());
        let rollback = RollbackManager::new(config.clone(), layout.clone());
        let history = HistoryStore::new(layout.history_file());

        info!(
            repo = %format!("{}/{}", config.repo_owner, config.repo_name),
            root = %config.project_root.display(),
            "update engine ready"
        );

        Ok(Self {
            config,
            layout,
            machine: OperationStateMachine::new(),
            source,
            downloads,
            installer,
            rollback,
            history,
            plan: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Current engine state. Synchronous, never blocks on an operation.
    pub fn state(&self) -> EngineState {
        self.machine.state()
    }

    /// Rollback archive metadata, if one exists. Pure inspection: valid in
    /// any state, mutates nothing.
    pub fn rollback_info(&self) -> Option<RollbackInfo> {
        self.rollback.info()
    }

    /// Persisted last-operation record.
    pub fn history(&self) -> UpdateHistory {
        self.history.load()
    }

    /// Resolve the next safe target version against the release history.
    pub async fn check(&self) -> Result<UpgradePlan> {
        let _guard = self.machine.begin(Operation::Check)?;
        let result = self.check_inner().await;
        match &result {
            Ok(plan) if plan.update_available => {
                self.history.record_check(CheckOutcome::UpdateAvailable {
                    current: plan.current_version,
                    target: plan.target_version,
                });
            }
            Ok(_) => self.history.record_check(CheckOutcome::UpToDate),
            Err(e) => self.history.record_check(CheckOutcome::Failed {
                error: e.to_string(),
            }),
        }
        result
    }

    async fn check_inner(&self) -> Result<UpgradePlan> {
        let current = manifest::read(&self.config.manifest_path())?;
        let releases = self.source.list_releases().await?;
        let cached = self.downloads.current().map(|r| r.version);
        let plan = resolver::resolve(current.version, &releases, cached)?;

        info!(
            current = %plan.current_version,
            target = %plan.target_version,
            available = plan.update_available,
            compatible = plan.is_latest_compatible,
            "check complete"
        );
        *self.lock_plan() = Some(plan.clone());
        Ok(plan)
    }

    /// Fetch the resolved target's asset into the local cache.
    pub async fn download(&self) -> Result<DownloadOutcome> {
        let _guard = self.machine.begin(Operation::Download)?;
        let plan = self.lock_plan().clone().ok_or_else(|| {
            UpdateError::Resolution("no upgrade plan in this session; run check first".to_string())
        })?;

        let record = self.downloads.download(self.source.as_ref(), &plan).await?;
        Ok(DownloadOutcome {
            version: record.version,
            size_bytes: record.size_bytes,
            path: record.path,
            is_latest: plan.target_version == plan.latest_version,
            is_intermediate: plan.target_version != plan.latest_version,
        })
    }

    /// Run the install transaction against the most recent download.
    /// The new version takes effect only after the caller restarts.
    pub async fn install(&self) -> Result<InstallOutcome> {
        let _guard = self.machine.begin(Operation::Install)?;
        let record = self.downloads.current().ok_or_else(|| {
            UpdateError::DownloadMissing("run check and download first".to_string())
        })?;
        self.downloads.verify(&record)?;
        let current = manifest::read(&self.config.manifest_path())?;

        let result = self.installer.install(&record, &current, &self.rollback).await;
        self.history.record_install(InstallRecord {
            at: Utc::now(),
            from_version: current.version,
            to_version: record.version,
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });
        let outcome = result?;

        // The download is consumed, and the session plan described a tree
        // that no longer exists.
        if let Err(e) = self.downloads.consume(&record) {
            warn!(error = %e, "failed to invalidate consumed download");
        }
        *self.lock_plan() = None;
        Ok(outcome)
    }

    /// Restore the project tree from the most recent rollback archive.
    pub async fn rollback(&self) -> Result<RollbackOutcome> {
        let _guard = self.machine.begin(Operation::Rollback)?;
        let result = self.rollback.restore().await;
        self.history.record_rollback(RollbackRecord {
            at: Utc::now(),
            restored_version: result.as_ref().ok().copied(),
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });
        Ok(RollbackOutcome {
            restored_version: result?,
        })
    }

    /// Empty the download cache. Rejected while downloading or installing.
    pub async fn clear_downloads(&self) -> Result<usize> {
        self.machine.check_maintenance(Operation::ClearDownloads)?;
        let removed = self.downloads.clear()?;
        info!(removed, "download cache cleared");
        Ok(removed)
    }

    /// Remove all backups AND the rollback archive. Irreversible: after
    /// this, `rollback` has nothing to restore from. Rejected while
    /// installing.
    pub async fn clear_backups(&self) -> Result<ClearBackupsOutcome> {
        self.machine.check_maintenance(Operation::ClearBackups)?;

        let mut backups_removed = 0;
        let dir = self.layout.backups_dir();
        if dir.exists() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    fs::remove_dir_all(entry.path())?;
                    backups_removed += 1;
                } else {
                    fs::remove_file(entry.path())?;
                }
            }
        }

        let rollback_removed = self.rollback.clear()?;
        if rollback_removed {
            warn!("rollback archive removed; rolling back is no longer possible");
        }
        info!(backups_removed, rollback_removed, "backups cleared");
        Ok(ClearBackupsOutcome {
            backups_removed,
            rollback_removed,
        })
    }

    fn lock_plan(&self) -> MutexGuard<'_, Option<UpgradePlan>> {
        self.plan.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for UpdateEngine {
    fn drop(&mut self) {
        ENGINE_SLOT.store(false, Ordering::SeqCst);
    }
}
