//! Error types for the update engine.
//!
//! Every operation reports failure to its immediate caller; nothing is
//! swallowed. The single automatic recovery is the install-failure restore,
//! whose dual-failure case is reported as [`UpdateError::RestoreFailed`].

use crate::op_state::Operation;
use crate::version::Version;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UpdateError>;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Missing repository identity, or a second engine constructed in one process.
    #[error("configuration error: {0}")]
    Config(String),

    /// An operation was attempted while another one holds the engine.
    #[error("cannot start {requested} while {active} is in progress")]
    StateConflict {
        requested: Operation,
        active: Operation,
    },

    /// Release-source communication failure, upstream HTTP status preserved.
    #[error("release source error: {message}")]
    Network {
        message: String,
        status: Option<u16>,
    },

    /// No release satisfies the computed upgrade path.
    #[error("upgrade resolution failed: {0}")]
    Resolution(String),

    #[error("invalid version string: {0:?}")]
    InvalidVersion(String),

    /// Project manifest missing, unreadable, or not valid JSON.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// The staged package demands a newer current version than installed.
    #[error("staged release requires version {required} or newer, current is {current}")]
    VersionMismatch { required: Version, current: Version },

    #[error("no completed download available: {0}")]
    DownloadMissing(String),

    #[error("no rollback archive available")]
    NoRollbackAvailable,

    #[error("filesystem error: {0}")]
    FileSystem(String),

    #[error("dependency install failed: {output}")]
    DependencyInstall {
        status: Option<i32>,
        output: String,
    },

    /// Install failed AND the automatic restore failed. The project tree is
    /// in an unknown state and the caller must be told so explicitly.
    #[error("install failed ({install}); automatic restore also failed ({restore}); project tree state is unknown")]
    RestoreFailed {
        install: Box<UpdateError>,
        restore: Box<UpdateError>,
    },
}

impl From<std::io::Error> for UpdateError {
    fn from(e: std::io::Error) -> Self {
        Self::FileSystem(e.to_string())
    }
}

impl From<zip::result::ZipError> for UpdateError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::FileSystem(format!("archive: {e}"))
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network {
            message: e.to_string(),
            status: e.status().map(|s| s.as_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_conflict_names_the_blocking_operation() {
        let err = UpdateError::StateConflict {
            requested: Operation::Download,
            active: Operation::Check,
        };
        let msg = err.to_string();
        assert!(msg.contains("download"), "{msg}");
        assert!(msg.contains("check"), "{msg}");
    }

    #[test]
    fn restore_failed_reports_both_errors() {
        let err = UpdateError::RestoreFailed {
            install: Box::new(UpdateError::FileSystem("copy failed".into())),
            restore: Box::new(UpdateError::NoRollbackAvailable),
        };
        let msg = err.to_string();
        assert!(msg.contains("copy failed"), "{msg}");
        assert!(msg.contains("no rollback archive"), "{msg}");
        assert!(msg.contains("unknown"), "{msg}");
    }
}
