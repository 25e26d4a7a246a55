//! Git clone seam. Implementations are blocking.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::ImportError;

pub trait GitCloner: Send + Sync {
    /// Clone `url` into `dest`, checking out `branch` when given.
    fn clone_repo(&self, url: &str, dest: &Path, branch: Option<&str>) -> Result<(), ImportError>;
}

/// Shells out to the `git` executable on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCloner for GitCli {
    fn clone_repo(&self, url: &str, dest: &Path, branch: Option<&str>) -> Result<(), ImportError> {
        let mut cmd = Command::new("git");
        cmd.arg("clone");
        if let Some(branch) = branch {
            cmd.args(["--branch", branch]);
        }
        cmd.arg("--").arg(url).arg(dest);

        let output = cmd
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| ImportError::Clone {
                url: url.to_string(),
                message: format!("cannot run git: {e}"),
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("git exited unsuccessfully")
            .trim()
            .to_string();
        Err(ImportError::Clone {
            url: url.to_string(),
            message,
        })
    }
}
