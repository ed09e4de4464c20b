//! Release-notes metadata block.
//!
//! A release may embed a machine-readable JSON block in its free-text notes,
//! recognized by a fixed marker:
//!
//! ```text
//! <!-- selfup:meta
//! { "minimumVersionRequired": "1.5.0", "changelog": { "added": ["..."] } }
//! -->
//! ```
//!
//! Absence of the block, or of any field inside it, means "no constraint".

use crate::version::Version;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Marker opening the metadata block inside release notes.
pub const METADATA_BLOCK_START: &str = "<!-- selfup:meta";

/// Marker closing the metadata block.
pub const METADATA_BLOCK_END: &str = "-->";

/// Structured metadata carried in a release's notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseMetadata {
    /// Oldest installed version allowed to upgrade directly to this release.
    pub minimum_version_required: Option<Version>,
    pub changelog: Option<Changelog>,
}

/// Categorized changelog. The categories are fixed; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Changelog {
    pub fixed: Vec<String>,
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub security: Vec<String>,
}

impl Changelog {
    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty()
            && self.added.is_empty()
            && self.changed.is_empty()
            && self.removed.is_empty()
            && self.security.is_empty()
    }
}

/// Extract the metadata block from release notes.
///
/// Release notes are human-edited text, so a malformed block is downgraded
/// to "no metadata" with a warning rather than failing the check.
pub fn parse(notes: &str) -> ReleaseMetadata {
    let Some(start) = notes.find(METADATA_BLOCK_START) else {
        return ReleaseMetadata::default();
    };
    let body = &notes[start + METADATA_BLOCK_START.len()..];
    let Some(end) = body.find(METADATA_BLOCK_END) else {
        warn!("release metadata block is not terminated; ignoring it");
        return ReleaseMetadata::default();
    };

    let raw = body[..end].trim();
    if raw.is_empty() {
        return ReleaseMetadata::default();
    }

    match serde_json::from_str(raw) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(error = %e, "malformed release metadata block; ignoring it");
            ReleaseMetadata::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_block_means_no_constraint() {
        let meta = parse("## 2.0.0\n\nBig release, see docs.");
        assert_eq!(meta, ReleaseMetadata::default());
        assert!(meta.minimum_version_required.is_none());
    }

    #[test]
    fn parses_minimum_version_and_changelog() {
        let notes = r#"Release notes here.

<!-- selfup:meta
{
  "minimumVersionRequired": "1.5.0",
  "changelog": {
    "added": ["plugin API"],
    "fixed": ["crash on empty config"],
    "security": ["bumped tls stack"]
  }
}
-->

Thanks to all contributors."#;

        let meta = parse(notes);
        assert_eq!(
            meta.minimum_version_required,
            Some(Version::new(1, 5, 0))
        );
        let changelog = meta.changelog.unwrap();
        assert_eq!(changelog.added, vec!["plugin API"]);
        assert_eq!(changelog.fixed, vec!["crash on empty config"]);
        assert_eq!(changelog.security, vec!["bumped tls stack"]);
        assert!(changelog.changed.is_empty());
        assert!(changelog.removed.is_empty());
    }

    #[test]
    fn missing_fields_default() {
        let meta = parse("<!-- selfup:meta {} -->");
        assert!(meta.minimum_version_required.is_none());
        assert!(meta.changelog.is_none());
    }

    #[test]
    fn malformed_block_is_ignored() {
        let meta = parse("<!-- selfup:meta { not json at all -->");
        assert_eq!(meta, ReleaseMetadata::default());

        let meta = parse("<!-- selfup:meta {\"minimumVersionRequired\": \"abc\"} -->");
        assert_eq!(meta, ReleaseMetadata::default());
    }

    #[test]
    fn unterminated_block_is_ignored() {
        let meta = parse("<!-- selfup:meta {\"minimumVersionRequired\": \"1.0.0\"}");
        assert_eq!(meta, ReleaseMetadata::default());
    }
}
