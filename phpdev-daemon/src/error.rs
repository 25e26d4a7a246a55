use std::path::PathBuf;

use phpdev_binaries::BinaryError;
use phpdev_core::{ErrorKind, ServerId, StoreError};
use phpdev_projects::ImportError;
use thiserror::Error;

/// Errors from the server orchestrator.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("project path {path} does not exist or is not a directory")]
    ProjectNotFound { path: PathBuf },

    #[error("document root {path} does not exist or is not a directory")]
    DocumentRootNotFound { path: PathBuf },

    #[error("no running server with id {id}")]
    UnknownServer { id: ServerId },

    #[error("{host}:{port} is already in use")]
    PortInUse { host: String, port: u16 },

    #[error("no free port on {host} in {start}..={end}")]
    NoFreePort { host: String, start: u16, end: u16 },

    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stop {} server(s): {}", .failures.len(), .failures.join("; "))]
    StopAll { failures: Vec<String> },

    #[error(transparent)]
    Binary(#[from] BinaryError),

    #[error(transparent)]
    Project(#[from] ImportError),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServerError::ProjectNotFound { .. }
            | ServerError::DocumentRootNotFound { .. }
            | ServerError::UnknownServer { .. } => ErrorKind::NotFound,
            ServerError::PortInUse { .. } | ServerError::NoFreePort { .. } => ErrorKind::Conflict,
            ServerError::Spawn { .. } => ErrorKind::SpawnFailed,
            ServerError::StopAll { .. } => ErrorKind::Io,
            ServerError::Binary(e) => e.kind(),
            ServerError::Project(e) => e.kind(),
        }
    }
}

/// Error surface for the daemon runtime and protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state error: {0}")]
    Store(#[from] StoreError),

    #[error("project registry error: {0}")]
    Project(#[from] ImportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("daemon socket already in use: {socket}")]
    AlreadyRunning { socket: PathBuf },

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

impl DaemonError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DaemonError::Store(e) => e.kind(),
            DaemonError::Project(e) => e.kind(),
            DaemonError::Remote { kind, .. } => *kind,
            DaemonError::AlreadyRunning { .. } => ErrorKind::Conflict,
            DaemonError::DaemonNotRunning { .. } => ErrorKind::NotFound,
            DaemonError::Json(_) | DaemonError::Protocol(_) => ErrorKind::InvalidInput,
            DaemonError::Io { .. } => ErrorKind::Io,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
