//! `phpdev php`: the binary cache.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use phpdev_core::PhpBinary;
use phpdev_daemon::DaemonRequest;

#[derive(Subcommand, Debug)]
pub enum PhpCommand {
    /// List configured and cached PHP versions.
    List(ListArgs),
    /// Download and validate a PHP version.
    Install { version: String },
    /// Print `php --version` for an installed version.
    Version { version: String },
    /// Delete a cached version.
    Remove { version: String },
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct BinaryRow {
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "path")]
    path: String,
}

pub fn run(command: PhpCommand) -> Result<()> {
    let home = super::home()?;

    match command {
        PhpCommand::List(args) => {
            let binaries: Vec<PhpBinary> = super::call(&home, DaemonRequest::ListPhpBinaries)?;
            if args.json {
                return super::print_json(&binaries);
            }
            if binaries.is_empty() {
                println!("No PHP versions configured.");
                return Ok(());
            }
            let rows: Vec<BinaryRow> = binaries.into_iter().map(binary_row).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        PhpCommand::Install { version } => {
            let binary: PhpBinary = super::call(
                &home,
                DaemonRequest::DownloadPhpBinary {
                    version: version.clone(),
                },
            )
            .with_context(|| format!("failed to install PHP {version}"))?;
            println!(
                "{} PHP {} at {}",
                "✓".green(),
                binary.version,
                super::or_dash(binary.path.map(|p| p.display().to_string()))
            );
        }
        PhpCommand::Version { version } => {
            let line: String = super::call(&home, DaemonRequest::GetPhpVersion { version })?;
            println!("{line}");
        }
        PhpCommand::Remove { version } => {
            let _: Value = super::call(
                &home,
                DaemonRequest::RemovePhpBinary {
                    version: version.clone(),
                },
            )
            .with_context(|| format!("failed to remove PHP {version}"))?;
            println!("{} removed PHP {version}", "✓".green());
        }
    }

    Ok(())
}

fn binary_row(binary: PhpBinary) -> BinaryRow {
    BinaryRow {
        status: if binary.downloaded {
            "installed".green().to_string()
        } else {
            "available".bright_black().to_string()
        },
        size: super::or_dash(binary.size.map(format_size)),
        path: super::or_dash(binary.path.map(|p| p.display().to_string())),
        version: binary.version,
    }
}

fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MiB", bytes as f64 / MIB)
}
