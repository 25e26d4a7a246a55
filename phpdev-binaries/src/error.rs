//! Error types for phpdev-binaries.

use std::path::PathBuf;

use phpdev_core::{ErrorKind, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinaryError {
    #[error("invalid PHP version '{0}': expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error("PHP {version} is not installed")]
    NotInstalled { version: String },

    #[error("PHP {version} is neither configured nor cached")]
    UnknownVersion { version: String },

    #[error("PHP {version} is in use by {servers} running server(s)")]
    InUse { version: String, servers: usize },

    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("downloaded PHP {version} failed validation: {message}")]
    Validation { version: String, message: String },

    #[error("PHP {version} did not answer --version within {secs}s")]
    Timeout { version: String, secs: u64 },

    #[error("failed to run {path}: {source}")]
    Exec {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no PHP build published for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] StoreError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BinaryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BinaryError::InvalidVersion(_) | BinaryError::UnsupportedPlatform { .. } => {
                ErrorKind::InvalidInput
            }
            BinaryError::NotInstalled { .. } | BinaryError::UnknownVersion { .. } => {
                ErrorKind::NotFound
            }
            BinaryError::InUse { .. } => ErrorKind::Conflict,
            BinaryError::Download { .. }
            | BinaryError::ChecksumMismatch { .. }
            | BinaryError::Validation { .. } => ErrorKind::DownloadFailed,
            BinaryError::Timeout { .. } => ErrorKind::Timeout,
            BinaryError::Exec { .. } => ErrorKind::SpawnFailed,
            BinaryError::Config(e) => e.kind(),
            BinaryError::Io { .. } | BinaryError::Join(_) => ErrorKind::Io,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BinaryError {
    BinaryError::Io {
        path: path.into(),
        source,
    }
}
