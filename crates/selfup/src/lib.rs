//! Selfup — self-update lifecycle engine.
//!
//! Lets a running application discover, fetch, and install new releases of
//! itself from GitHub Releases, with backups and a rollback archive as the
//! safety net against a failed or incompatible upgrade.
//!
//! Workflow: [`UpdateEngine::check`] resolves the next safe target version
//! (honoring minimum-version constraints declared in release notes),
//! [`UpdateEngine::download`] caches that target's asset, and
//! [`UpdateEngine::install`] performs a transactional clean replace of the
//! project tree — automatically restored from the rollback archive if
//! anything fails midway. The caller restarts the process afterwards;
//! [`UpdateEngine::rollback`] undoes the most recent install.

pub mod archive;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod fs_tree;
pub mod github_releases;
pub mod history;
pub mod install;
pub mod layout;
pub mod manifest;
pub mod op_state;
pub mod release_notes;
pub mod resolver;
pub mod rollback;
pub mod version;

pub use config::UpdateConfig;
pub use download::{DownloadOutcome, DownloadRecord};
pub use engine::{ClearBackupsOutcome, UpdateEngine};
pub use error::{Result, UpdateError};
pub use github_releases::{GitHubClient, Release, ReleaseAsset, ReleaseSource};
pub use history::UpdateHistory;
pub use install::{BackupRecord, InstallOutcome};
pub use op_state::{EngineState, Operation};
pub use release_notes::{Changelog, ReleaseMetadata};
pub use resolver::UpgradePlan;
pub use rollback::{RollbackInfo, RollbackOutcome};
pub use version::Version;
