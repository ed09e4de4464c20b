//! Upgrade-path resolution.
//!
//! Given the installed version and the release history, compute the next
//! safe target. A release may declare a minimum version in its notes; when
//! the installed version is below it, the target becomes the stepping-stone
//! release that carries exactly that version. The plan is single-hop: after
//! installing an intermediate the caller runs `check` again.

use crate::error::{Result, UpdateError};
use crate::github_releases::Release;
use crate::release_notes::{self, Changelog};
use crate::version::Version;
use serde::Serialize;
use tracing::{debug, warn};

/// The resolved decision of what to install next. Computed fresh on every
/// check, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradePlan {
    pub current_version: Version,
    pub latest_version: Version,
    pub target_version: Version,
    /// False when the latest release demands an intermediate hop first.
    pub is_latest_compatible: bool,
    pub minimum_version_required: Option<Version>,
    pub update_available: bool,
    /// True when a cached download already matches the target version.
    pub downloaded: bool,
    pub changelog: Option<Changelog>,
    /// The release to fetch the asset from.
    #[serde(skip)]
    pub target_release: Release,
}

/// Resolve the next safe target version.
///
/// `cached_download` is the version of whatever download is currently on
/// disk, if any, so callers can skip an unnecessary fetch.
pub fn resolve(
    current: Version,
    releases: &[Release],
    cached_download: Option<Version>,
) -> Result<UpgradePlan> {
    // Latest stable = highest-versioned non-prerelease with a parseable tag.
    let mut latest: Option<(Version, &Release)> = None;
    for release in releases.iter().filter(|r| !r.prerelease) {
        match release.version() {
            Ok(version) => {
                if latest.map_or(true, |(best, _)| version > best) {
                    latest = Some((version, release));
                }
            }
            Err(_) => {
                warn!(tag = %release.tag_name, "skipping release with unparseable tag");
            }
        }
    }
    let (latest_version, latest_release) =
        latest.ok_or_else(|| UpdateError::Resolution("no stable releases found".to_string()))?;

    let metadata = release_notes::parse(&latest_release.body);
    let minimum = metadata.minimum_version_required;

    let (target_version, target_release, is_latest_compatible) = match minimum {
        Some(required) if current < required => {
            // The caller must not guess a substitute: the stepping-stone
            // release has to exist with exactly the required version.
            let stepping_stone = releases
                .iter()
                .filter(|r| !r.prerelease)
                .find(|r| r.version().map(|v| v == required).unwrap_or(false))
                .ok_or_else(|| {
                    UpdateError::Resolution(format!(
                        "latest release {latest_version} requires {required} first, \
                         but no release with that version exists"
                    ))
                })?;
            (required, stepping_stone, false)
        }
        _ => (latest_version, latest_release, true),
    };

    let update_available = target_version > current;
    let downloaded = cached_download == Some(target_version);

    debug!(
        current = %current,
        latest = %latest_version,
        target = %target_version,
        compatible = is_latest_compatible,
        available = update_available,
        "upgrade path resolved"
    );

    Ok(UpgradePlan {
        current_version: current,
        latest_version,
        target_version,
        is_latest_compatible,
        minimum_version_required: minimum,
        update_available,
        downloaded,
        changelog: metadata.changelog,
        target_release: target_release.clone(),
    })
}
