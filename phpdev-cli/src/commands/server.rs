//! `phpdev server`: development server lifecycle.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use phpdev_core::{ServerId, ServerStatus, StartServerRequest};
use phpdev_daemon::{DaemonRequest, RunningServer};

#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    /// Start `php -S` for a project directory.
    Start(StartArgs),
    /// Stop a server by id.
    Stop { id: String },
    /// Stop every running server.
    StopAll,
    /// Show one server.
    Status {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// List running servers.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print captured server output.
    Logs { id: String },
    /// Find the first free port at or above `start`.
    Port {
        #[arg(default_value_t = 8000)]
        start: u16,
    },
}

#[derive(Args, Debug)]
pub struct StartArgs {
    pub path: PathBuf,

    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    #[arg(long)]
    pub host: Option<String>,

    /// PHP version, e.g. 8.3.0.
    #[arg(long = "php")]
    pub php_version: Option<String>,

    /// Document root, relative to the project unless absolute.
    #[arg(long = "docroot")]
    pub document_root: Option<PathBuf>,
}

#[derive(Tabled)]
struct ServerRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "url")]
    url: String,
    #[tabled(rename = "php")]
    php: String,
    #[tabled(rename = "pid")]
    pid: String,
    #[tabled(rename = "uptime")]
    uptime: String,
    #[tabled(rename = "project")]
    project: String,
}

pub fn run(command: ServerCommand) -> Result<()> {
    let home = super::home()?;

    match command {
        ServerCommand::Start(args) => {
            let request = StartServerRequest {
                project_path: super::absolute(&args.path)?,
                port: args.port,
                host: args.host,
                php_version: args.php_version,
                document_root: args.document_root,
            };
            let id: ServerId = super::call(&home, DaemonRequest::StartServer { request })
                .with_context(|| format!("failed to start server for {}", args.path.display()))?;
            let status: ServerStatus = super::call(
                &home,
                DaemonRequest::GetServerStatus {
                    server_id: id.clone(),
                },
            )?;
            println!(
                "{} {} serving {} on {}",
                "✓".green(),
                id,
                status.document_root.display(),
                url(&status).bold()
            );
        }
        ServerCommand::Stop { id } => {
            let _: Value = super::call(
                &home,
                DaemonRequest::StopServer {
                    server_id: ServerId::from(id.clone()),
                },
            )?;
            println!("{} stopped {id}", "✓".green());
        }
        ServerCommand::StopAll => {
            let summary: Value = super::call(&home, DaemonRequest::StopAllServers)?;
            println!(
                "{} stopped {} server(s)",
                "✓".green(),
                summary["stopped"].as_u64().unwrap_or(0)
            );
        }
        ServerCommand::Status { id, json } => {
            let status: ServerStatus = super::call(
                &home,
                DaemonRequest::GetServerStatus {
                    server_id: ServerId::from(id.clone()),
                },
            )?;
            if json {
                return super::print_json(&status);
            }
            print_table(vec![RunningServer {
                id: ServerId::from(id),
                status,
            }]);
        }
        ServerCommand::List { json } => {
            let servers: Vec<RunningServer> =
                super::call(&home, DaemonRequest::ListRunningServers)?;
            if json {
                return super::print_json(&servers);
            }
            if servers.is_empty() {
                println!("No servers running.");
                return Ok(());
            }
            print_table(servers);
        }
        ServerCommand::Logs { id } => {
            let logs: String = super::call(
                &home,
                DaemonRequest::GetServerLogs {
                    server_id: ServerId::from(id),
                },
            )?;
            print!("{logs}");
        }
        ServerCommand::Port { start } => {
            let port: u16 =
                super::call(&home, DaemonRequest::FindAvailablePort { start_port: start })?;
            println!("{port}");
        }
    }

    Ok(())
}

fn print_table(servers: Vec<RunningServer>) {
    let rows: Vec<ServerRow> = servers
        .into_iter()
        .map(|s| ServerRow {
            url: url(&s.status),
            php: s.status.php_version.clone(),
            pid: super::or_dash(s.status.pid),
            uptime: format_uptime(&s.status),
            project: s.status.project_path.display().to_string(),
            id: s.id.to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn url(status: &ServerStatus) -> String {
    if status.host.contains(':') {
        format!("http://[{}]:{}", status.host, status.port)
    } else {
        format!("http://{}:{}", status.host, status.port)
    }
}

fn format_uptime(status: &ServerStatus) -> String {
    let secs = (Utc::now() - status.started_at).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{}h {}m", s / 3600, (s % 3600) / 60),
    }
}
