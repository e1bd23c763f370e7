//! Error types shared by the backup store, patch engine and orchestrator.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemedyError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("No backups found for {0}")]
    NoBackups(String),

    #[error("Invalid version {requested}. Available versions: 1-{available}")]
    InvalidVersion { requested: usize, available: usize },

    #[error("Backup file not found: {}", .0.display())]
    MissingBackupFile(PathBuf),

    #[error("{} is outside the workspace {}", .path.display(), .workspace.display())]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Multiple matches found for '{name}': {}", join_paths(.matches))]
    Ambiguous { name: String, matches: Vec<PathBuf> },

    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("Analyzer `{analyzer}` failed: {reason}")]
    AnalyzerFailure { analyzer: String, reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup index is unreadable: {0}")]
    Index(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RemedyError>;

/// Coarse failure classes reported alongside every failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    NoBackups,
    InvalidVersion,
    InvalidTarget,
    IoFailure,
    AnalyzerFailure,
}

impl RemedyError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::MissingBackupFile(_) => ErrorKind::NotFound,
            Self::NoBackups(_) => ErrorKind::NoBackups,
            Self::InvalidVersion { .. } => ErrorKind::InvalidVersion,
            Self::OutsideWorkspace { .. } | Self::Ambiguous { .. } | Self::NotAFile(_) => {
                ErrorKind::InvalidTarget
            }
            Self::AnalyzerFailure { .. } => ErrorKind::AnalyzerFailure,
            Self::Io { .. } | Self::Index(_) => ErrorKind::IoFailure,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_version_message_lists_range() {
        let err = RemedyError::InvalidVersion {
            requested: 5,
            available: 2,
        };
        assert_eq!(err.to_string(), "Invalid version 5. Available versions: 1-2");
        assert_eq!(err.kind(), ErrorKind::InvalidVersion);
    }

    #[test]
    fn missing_backup_file_is_not_found() {
        let err = RemedyError::MissingBackupFile(PathBuf::from("/tmp/x.bak"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn ambiguous_lists_every_match() {
        let err = RemedyError::Ambiguous {
            name: "node.py".into(),
            matches: vec![PathBuf::from("a/node.py"), PathBuf::from("b/node.py")],
        };
        let msg = err.to_string();
        assert!(msg.contains("a/node.py"));
        assert!(msg.contains("b/node.py"));
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn io_errors_are_io_failures() {
        let err = RemedyError::io(
            "/nowhere",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(err.to_string().contains("/nowhere"));
    }
}
