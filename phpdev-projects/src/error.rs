//! Error types for phpdev-projects.

use std::path::PathBuf;

use phpdev_core::{ErrorKind, ProjectName, StoreError};
use phpdev_detector::DetectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot derive a project name from '{url}'")]
    InvalidUrl { url: String },

    #[error("invalid project name '{0}'")]
    InvalidName(String),

    #[error("project '{name}' is already registered")]
    DuplicateName { name: ProjectName },

    #[error("destination {path} already exists and is not empty")]
    DestinationExists { path: PathBuf },

    #[error("{path} does not exist or is not a directory")]
    PathNotFound { path: PathBuf },

    #[error("no project named '{name}'")]
    UnknownProject { name: ProjectName },

    #[error("git clone of {url} failed: {message}")]
    Clone { url: String, message: String },

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::InvalidUrl { .. } | ImportError::InvalidName(_) => ErrorKind::InvalidInput,
            ImportError::DuplicateName { .. } | ImportError::DestinationExists { .. } => {
                ErrorKind::Conflict
            }
            ImportError::PathNotFound { .. } | ImportError::UnknownProject { .. } => {
                ErrorKind::NotFound
            }
            ImportError::Clone { .. } => ErrorKind::CloneFailed,
            ImportError::Detect(e) => e.kind(),
            ImportError::Store(e) => e.kind(),
            ImportError::Io { .. } | ImportError::Join(_) => ErrorKind::Io,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ImportError {
    ImportError::Io {
        path: path.into(),
        source,
    }
}
