//! Typed errors for playlist file operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the core while touching playlist, staging or backup files
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to list folder {}: {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{label} folder is unavailable: {}", path.display())]
    DeviceUnavailable { label: String, path: PathBuf },

    /// The staging ("Conversion") folder is gone; nothing can be compared or staged
    #[error("staging folder is unavailable: {}", .0.display())]
    StagingUnavailable(PathBuf),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

impl SyncError {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    pub fn list(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::List {
            path: path.into(),
            source,
        }
    }

    pub fn delete(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Delete {
            path: path.into(),
            source,
        }
    }
}
