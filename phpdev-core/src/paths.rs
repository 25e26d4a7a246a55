//! On-disk layout.
//!
//! ```text
//! ~/.phpdev/
//!   config.yaml          (Config, mode 0600)
//!   projects.yaml        (project registry, mode 0600)
//!   php/<version>/bin/php
//!   daemon.sock
//! ~/phpdev-projects/     (default clone destination)
//! ```
//!
//! Every helper takes an explicit `home` so tests can root state in a `TempDir`.

use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const CONFIG_FILE: &str = "config.yaml";
pub const PROJECTS_FILE: &str = "projects.yaml";
pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn phpdev_root(home: &Path) -> PathBuf {
    home.join(".phpdev")
}

pub fn config_path(home: &Path) -> PathBuf {
    phpdev_root(home).join(CONFIG_FILE)
}

pub fn projects_registry_path(home: &Path) -> PathBuf {
    phpdev_root(home).join(PROJECTS_FILE)
}

pub fn binaries_dir(home: &Path) -> PathBuf {
    phpdev_root(home).join("php")
}

pub fn socket_path(home: &Path) -> PathBuf {
    phpdev_root(home).join(DAEMON_SOCKET)
}

pub fn default_projects_dir(home: &Path) -> PathBuf {
    home.join("phpdev-projects")
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}
