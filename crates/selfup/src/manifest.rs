//! Project manifest access.
//!
//! The manifest is a JSON file at the project root (`package.json` by
//! default) carrying the installed version and, optionally, the oldest
//! version allowed to upgrade onto it. All other fields are ignored.

use crate::error::{Result, UpdateError};
use crate::version::Version;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectManifest {
    pub version: Version,
    #[serde(rename = "minimumVersionRequired")]
    pub minimum_version_required: Option<Version>,
}

/// Read and parse the manifest at `path`.
pub fn read(path: &Path) -> Result<ProjectManifest> {
    let raw = fs::read_to_string(path)
        .map_err(|e| UpdateError::Manifest(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| UpdateError::Manifest(format!("{}: {e}", path.display())))
}
