//! `phpdev daemon`: foreground runtime and socket lifecycle.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use phpdev_core::paths::socket_path;
use phpdev_daemon::{request_shutdown, request_status, start_blocking, DaemonError, LogFormat};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground.
    Start(StartArgs),
    /// Stop every server and shut the daemon down.
    Stop,
    /// Query daemon runtime status.
    Status,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = super::home()?;

    match command {
        DaemonCommand::Start(args) => {
            let format = if args.json_logs {
                LogFormat::Json
            } else {
                LogFormat::Text
            };
            start_blocking(&home, format).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_shutdown(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => super::print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                super::print_json(&serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }))?;
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
    }

    Ok(())
}
