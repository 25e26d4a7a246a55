pub mod config;
pub mod daemon;
pub mod detect;
pub mod php;
pub mod project;
pub mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use phpdev_daemon::{request, DaemonError, DaemonRequest};

pub fn home() -> Result<PathBuf> {
    phpdev_core::paths::home().context("could not determine home directory")
}

/// Send `req` to the daemon and decode the payload.
pub fn call<T: DeserializeOwned>(home: &Path, req: DaemonRequest) -> Result<T> {
    let value = request(home, &req).map_err(|err| match err {
        DaemonError::DaemonNotRunning { .. } => {
            anyhow::anyhow!("daemon is not running; start it with `phpdev daemon start`")
        }
        other => anyhow::Error::new(other),
    })?;
    serde_json::from_value(value).context("unexpected daemon response")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}

/// Absolute form of a user-supplied path; the daemon may run elsewhere.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("could not read current directory")?;
    Ok(cwd.join(path))
}

pub fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
