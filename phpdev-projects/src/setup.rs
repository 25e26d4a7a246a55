//! Post-clone setup commands (`composer install`, ...). Blocking.

use std::path::Path;
use std::process::{Command, Stdio};

pub trait SetupRunner: Send + Sync {
    /// Run one shell command line in `cwd`; `Err` carries a short reason.
    fn run(&self, command: &str, cwd: &Path) -> Result<(), String>;
}

/// Runs each command through the platform shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl SetupRunner for ShellRunner {
    fn run(&self, command: &str, cwd: &Path) -> Result<(), String> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        let output = cmd
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("cannot start shell: {e}"))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => Err(format!("{}: {}", output.status, line.trim())),
            None => Err(output.status.to_string()),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn reports_exit_status_and_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(ShellRunner.run("true", dir.path()).is_ok());
        let err = ShellRunner.run("echo boom >&2; exit 4", dir.path()).unwrap_err();
        assert!(err.contains("boom"), "got {err}");
    }

    #[test]
    fn runs_in_given_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        ShellRunner.run("touch marker", dir.path()).unwrap();
        assert!(dir.path().join("marker").exists());
    }
}
