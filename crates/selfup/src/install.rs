//! The clean-install transaction.
//!
//! Ordered steps, each a commit point recorded in a step ledger:
//!
//! 1. extract the cached archive into the staging directory
//! 2. sanity-check the staged manifest against the current version
//! 3. back up the configured paths
//! 4. create the rollback archive
//! 5. destructive replace (delete-except-preserve, copy staging in)
//! 6. run the dependency installer
//! 7. discard staging
//!
//! A failure after the rollback archive exists triggers an automatic
//! restore; the caller still receives the ORIGINAL error. A failure of the
//! restore itself is reported together with the original, because the tree
//! is then in an unknown state.

use crate::config::UpdateConfig;
use crate::download::DownloadRecord;
use crate::error::{Result, UpdateError};
use crate::layout::StateLayout;
use crate::manifest::{self, ProjectManifest};
use crate::rollback::{RollbackInfo, RollbackManager};
use crate::version::Version;
use crate::{archive, fs_tree};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Paths saved aside before an install, tagged with the pre-update version.
#[derive(Debug, Clone, Serialize)]
pub struct BackupRecord {
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub path: PathBuf,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub previous_version: Version,
    pub installed_version: Version,
    /// The snapshot available for `rollback` after this install.
    pub rollback: RollbackInfo,
}

/// How far the transaction progressed; tells the recovery path exactly what
/// there is to undo.
#[derive(Debug, Default, Clone, Copy)]
struct StepLedger {
    staged: bool,
    sanity_checked: bool,
    backed_up: bool,
    rollback_archived: bool,
    tree_replaced: bool,
    deps_installed: bool,
}

impl StepLedger {
    /// First step that did not complete, for diagnostics.
    fn failed_step(&self) -> &'static str {
        if !self.staged {
            "stage"
        } else if !self.sanity_checked {
            "sanity-check"
        } else if !self.backed_up {
            "backup"
        } else if !self.rollback_archived {
            "rollback-archive"
        } else if !self.tree_replaced {
            "replace"
        } else if !self.deps_installed {
            "dependency-install"
        } else {
            "cleanup"
        }
    }
}

pub struct InstallManager {
    config: UpdateConfig,
    layout: StateLayout,
}

impl InstallManager {
    pub fn new(config: UpdateConfig, layout: StateLayout) -> Self {
        Self { config, layout }
    }

    /// Run the full install transaction against a verified download.
    pub async fn install(
        &self,
        record: &DownloadRecord,
        current: &ProjectManifest,
        rollback: &RollbackManager,
    ) -> Result<InstallOutcome> {
        let mut ledger = StepLedger::default();
        let staging = self.layout.staging_dir();

        info!(
            from = %current.version,
            to = %record.version,
            "starting install transaction"
        );

        // Steps 1-2 touch nothing outside staging; no recovery needed.
        let staged_manifest = match self.stage_and_check(record, current, &mut ledger) {
            Ok(m) => m,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        // Steps 3-6.
        let result = self
            .destructive_phase(&staging, current.version, rollback, &mut ledger)
            .await;
        let rollback_info = match result {
            Ok(info) => info,
            Err(install_err) => {
                let _ = fs::remove_dir_all(&staging);
                if !ledger.rollback_archived {
                    // Nothing destructive has happened yet.
                    return Err(install_err);
                }
                warn!(
                    step = ledger.failed_step(),
                    error = %install_err,
                    "install failed after snapshot; restoring project tree"
                );
                return match rollback.restore().await {
                    Ok(version) => {
                        info!(version = %version, "automatic restore complete");
                        Err(install_err)
                    }
                    Err(restore_err) => Err(UpdateError::RestoreFailed {
                        install: Box::new(install_err),
                        restore: Box::new(restore_err),
                    }),
                };
            }
        };

        // Step 7: staging is scratch space, failure to drop it is not fatal.
        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!(error = %e, "failed to discard staging directory");
        }

        info!(
            from = %current.version,
            to = %staged_manifest.version,
            "install complete; restart required to take effect"
        );

        Ok(InstallOutcome {
            previous_version: current.version,
            installed_version: staged_manifest.version,
            rollback: rollback_info,
        })
    }

    /// Steps 1-2: extract into staging and re-verify compatibility against
    /// the manifest shipped INSIDE the archive. Release-notes metadata may be
    /// absent or stale; this check is the authoritative one.
    fn stage_and_check(
        &self,
        record: &DownloadRecord,
        current: &ProjectManifest,
        ledger: &mut StepLedger,
    ) -> Result<ProjectManifest> {
        let staging = self.layout.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        archive::unpack(&record.path, &staging)?;
        ledger.staged = true;

        let staged_manifest = manifest::read(&staging.join(&self.config.manifest_file))?;
        if let Some(required) = staged_manifest.minimum_version_required {
            if current.version < required {
                return Err(UpdateError::VersionMismatch {
                    required,
                    current: current.version,
                });
            }
        }
        ledger.sanity_checked = true;
        Ok(staged_manifest)
    }

    /// Steps 3-6. Any error here bubbles to the recovery policy in `install`.
    async fn destructive_phase(
        &self,
        staging: &Path,
        current_version: Version,
        rollback: &RollbackManager,
        ledger: &mut StepLedger,
    ) -> Result<RollbackInfo> {
        let backup = self.create_backup(current_version)?;
        ledger.backed_up = true;
        info!(
            path = %backup.path.display(),
            files = backup.files.len(),
            "backup created"
        );

        let rollback_info = rollback.create_archive(current_version)?;
        ledger.rollback_archived = true;

        let preserve = self.config.preserve_set();
        fs_tree::remove_children_except(&self.config.project_root, &preserve)?;
        fs_tree::copy_children(staging, &self.config.project_root, &preserve)?;
        ledger.tree_replaced = true;

        run_dependency_installer(&self.config.install_command, &self.config.project_root).await?;
        ledger.deps_installed = true;

        Ok(rollback_info)
    }

    fn create_backup(&self, version: Version) -> Result<BackupRecord> {
        let timestamp = Utc::now();
        let dir = self
            .layout
            .backups_dir()
            .join(format!("{version}-{}", timestamp.format("%Y%m%dT%H%M%SZ")));
        fs::create_dir_all(&dir)?;
        let files = fs_tree::copy_paths(&self.config.project_root, &self.config.backup_paths, &dir)?;
        Ok(BackupRecord {
            version,
            timestamp,
            path: dir,
            files,
        })
    }
}

/// Invoke the external dependency installer in `cwd`. Success is exit 0;
/// anything else carries the captured output back to the caller.
pub(crate) async fn run_dependency_installer(command: &[String], cwd: &Path) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| UpdateError::Config("install_command must not be empty".to_string()))?;

    info!(command = %command.join(" "), "running dependency installer");
    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| UpdateError::DependencyInstall {
            status: None,
            output: format!("failed to spawn {program}: {e}"),
        })?;

    if !output.status.success() {
        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(UpdateError::DependencyInstall {
            status: output.status.code(),
            output: captured.trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dependency_installer_reports_exit_status_and_output() {
        let dir = tempfile::tempdir().unwrap();

        run_dependency_installer(&["true".to_string()], dir.path())
            .await
            .unwrap();

        let err = run_dependency_installer(
            &[
                "sh".to_string(),
                "-c".to_string(),
                "echo broken dependency >&2; exit 3".to_string(),
            ],
            dir.path(),
        )
        .await
        .unwrap_err();
        match err {
            UpdateError::DependencyInstall { status, output } => {
                assert_eq!(status, Some(3));
                assert!(output.contains("broken dependency"), "{output}");
            }
            other => panic!("expected DependencyInstall, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_failure_is_a_dependency_install_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_dependency_installer(
            &["definitely-not-a-real-binary-xyz".to_string()],
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            UpdateError::DependencyInstall { status: None, .. }
        ));
    }
}
