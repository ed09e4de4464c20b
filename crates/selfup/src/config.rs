//! Engine configuration.
//!
//! Built programmatically by the embedding application, or loaded from a
//! TOML file. Only the repository identity is mandatory; everything else
//! has defaults suited to a node-style project tree.

use crate::error::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST_FILE: &str = "package.json";
pub const DEFAULT_STATE_DIR: &str = ".selfup";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Owner of the release-hosting repository. Required.
    pub repo_owner: String,
    /// Name of the release-hosting repository. Required.
    pub repo_name: String,
    /// Bearer token for private repositories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Root of the project tree being updated.
    pub project_root: PathBuf,
    /// Manifest file name at the project root.
    pub manifest_file: String,
    /// Engine state directory name, created under the project root.
    pub state_dir: String,
    /// Top-level entry names exempt from deletion during a clean install or
    /// rollback. The state directory is always preserved in addition.
    pub preserve: Vec<String>,
    /// Relative paths copied into a backup directory before each install.
    pub backup_paths: Vec<String>,
    /// Dependency installer argv, run in the project root after a replace.
    pub install_command: Vec<String>,
    /// Substring selecting which release asset to download; first asset if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_pattern: Option<String>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            repo_owner: String::new(),
            repo_name: String::new(),
            auth_token: None,
            project_root: PathBuf::from("."),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            state_dir: DEFAULT_STATE_DIR.to_string(),
            preserve: vec![".env".to_string(), ".git".to_string()],
            backup_paths: vec![DEFAULT_MANIFEST_FILE.to_string()],
            install_command: vec!["npm".to_string(), "install".to_string()],
            asset_pattern: None,
        }
    }
}

impl UpdateConfig {
    pub fn new(
        repo_owner: impl Into<String>,
        repo_name: impl Into<String>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repo_owner: repo_owner.into(),
            repo_name: repo_name.into(),
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| UpdateError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| UpdateError::Config(format!("{}: {e}", path.display())))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.repo_owner.trim().is_empty() || self.repo_name.trim().is_empty() {
            return Err(UpdateError::Config(
                "repository owner and name are required".to_string(),
            ));
        }
        if self.install_command.is_empty() {
            return Err(UpdateError::Config(
                "install_command must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_root.join(&self.manifest_file)
    }

    pub fn state_dir_path(&self) -> PathBuf {
        self.project_root.join(&self.state_dir)
    }

    /// Preserve list as top-level entry names, state dir included.
    pub(crate) fn preserve_set(&self) -> HashSet<OsString> {
        let mut set: HashSet<OsString> =
            self.preserve.iter().map(OsString::from).collect();
        set.insert(OsString::from(&self.state_dir));
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_preserve_env_git_and_state_dir() {
        let config = UpdateConfig::new("acme", "app", "/tmp/app");
        let preserve = config.preserve_set();
        assert!(preserve.contains(&OsString::from(".env")));
        assert!(preserve.contains(&OsString::from(".git")));
        assert!(preserve.contains(&OsString::from(".selfup")));
    }

    #[test]
    fn validate_requires_repository_identity() {
        let config = UpdateConfig::default();
        assert!(matches!(config.validate(), Err(UpdateError::Config(_))));

        let config = UpdateConfig::new("acme", "app", ".");
        config.validate().unwrap();

        let mut config = UpdateConfig::new("acme", "app", ".");
        config.install_command.clear();
        assert!(matches!(config.validate(), Err(UpdateError::Config(_))));
    }

    #[test]
    fn loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selfup.toml");
        fs::write(
            &path,
            r#"
repo_owner = "acme"
repo_name = "app"
project_root = "/srv/app"
preserve = [".env", ".git", "uploads"]
install_command = ["pnpm", "install", "--frozen-lockfile"]
"#,
        )
        .unwrap();

        let config = UpdateConfig::load(&path).unwrap();
        assert_eq!(config.repo_owner, "acme");
        assert_eq!(config.project_root, PathBuf::from("/srv/app"));
        assert_eq!(config.preserve.len(), 3);
        assert_eq!(config.manifest_file, DEFAULT_MANIFEST_FILE);
        assert_eq!(config.install_command[0], "pnpm");
    }
}
