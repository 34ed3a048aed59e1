//! Error types for the transfer engine.
//!
//! `EngineError` is the task-level error. Anything that reaches the caller as
//! an `EngineError` has terminated the task; per-entry failures during
//! deletion or rollback are logged and never surface here.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that terminate a task.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A directory walk failed while building the file set
    #[error("failed to enumerate {}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Lock / sharing violation, disk full, or any other I/O fault
    #[error("filesystem error at {}", path.display())]
    FilesystemIo { path: PathBuf, source: io::Error },

    /// The OS refused access to a path
    #[error("permission denied at {}", path.display())]
    PermissionDenied { path: PathBuf, source: io::Error },

    /// The operator cancelled the task
    #[error("operation cancelled")]
    Cancelled,

    /// The source archive could not be read as a container
    #[error("archive is unreadable: {}", path.display())]
    ArchiveCorrupt {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// The task cannot run as described
    #[error("invalid task: {reason}")]
    InvalidTask { reason: String },

    /// Engine configuration failed validation or parsing
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Plain discriminant of [`EngineError`], for schedulers that only need to
/// branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EnumerationFailed,
    FilesystemIo,
    PermissionDenied,
    Cancelled,
    ArchiveCorrupt,
    InvalidTask,
    InvalidConfig,
}

impl EngineError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            EngineError::PermissionDenied { path, source }
        } else {
            EngineError::FilesystemIo { path, source }
        }
    }

    /// Classify a zip error raised while touching the archive at `path`.
    ///
    /// Zip errors that wrap an I/O failure are treated like any other I/O
    /// failure so a full disk while writing an archive is not reported as
    /// corruption.
    pub fn from_zip(path: impl AsRef<Path>, source: zip::result::ZipError) -> Self {
        match source {
            zip::result::ZipError::Io(err) => Self::from_io(path, err),
            other => EngineError::ArchiveCorrupt {
                path: path.as_ref().to_path_buf(),
                source: other,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EnumerationFailed { .. } => ErrorKind::EnumerationFailed,
            Self::FilesystemIo { .. } => ErrorKind::FilesystemIo,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ArchiveCorrupt { .. } => ErrorKind::ArchiveCorrupt,
            Self::InvalidTask { .. } => ErrorKind::InvalidTask,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
        }
    }

    /// True for failures that may have left partial artifacts on disk.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::FilesystemIo
                | ErrorKind::PermissionDenied
                | ErrorKind::Cancelled
                | ErrorKind::ArchiveCorrupt
        )
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::EnumerationFailed { source, .. }
            | Self::FilesystemIo { source, .. }
            | Self::PermissionDenied { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_classified() {
        let err = EngineError::from_io(
            "/x",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(err.is_transfer_failure());
    }

    #[test]
    fn test_other_io_is_filesystem_error() {
        let err = EngineError::from_io("/x", io::Error::new(io::ErrorKind::Other, "disk full"));
        assert_eq!(err.kind(), ErrorKind::FilesystemIo);
    }

    #[test]
    fn test_zip_io_error_is_unwrapped() {
        let zip_err = zip::result::ZipError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
        let err = EngineError::from_zip("/a.zip", zip_err);
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = EngineError::from_zip("/a.zip", zip::result::ZipError::InvalidArchive("bad"));
        assert_eq!(err.kind(), ErrorKind::ArchiveCorrupt);
    }

    #[test]
    fn test_enumeration_failure_is_not_a_transfer_failure() {
        let err = EngineError::EnumerationFailed {
            path: PathBuf::from("/lib"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(!err.is_transfer_failure());
        assert!(err.to_string().contains("/lib"));
    }
}
