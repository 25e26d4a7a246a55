//! Error types for phpdev-core.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-facing classification shared by every phpdev crate.
///
/// Each crate error maps onto exactly one kind via its `kind()` method; the
/// daemon protocol sends the kind alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown server id, project name, version or path.
    NotFound,
    /// Port already bound, destination exists, name taken, version in use.
    Conflict,
    /// Network or validation failure while fetching a binary.
    DownloadFailed,
    /// The OS refused to create a process.
    SpawnFailed,
    /// The git collaborator failed to clone.
    CloneFailed,
    /// A bounded wait elapsed.
    Timeout,
    /// Malformed request data.
    InvalidInput,
    /// Persistence or filesystem failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::DownloadFailed => "download_failed",
            ErrorKind::SpawnFailed => "spawn_failed",
            ErrorKind::CloneFailed => "clone_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// Errors from the config store and the project registry file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the file involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A configuration value was rejected before being persisted.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.phpdev/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Invalid(_) => ErrorKind::InvalidInput,
            StoreError::HomeNotFound => ErrorKind::NotFound,
            StoreError::Io { .. } | StoreError::Yaml(_) | StoreError::Parse { .. } => {
                ErrorKind::Io
            }
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
