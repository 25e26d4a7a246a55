//! phpdev: local PHP development environment.
//!
//! # Usage
//!
//! ```text
//! phpdev daemon start|stop|status
//! phpdev php list|install <version>|version <version>|remove <version>
//! phpdev project list|add <path>|remove <name>|clone <url>|info <path>
//! phpdev server start <path>|stop <id>|stop-all|status <id>|list|logs <id>|port
//! phpdev config show|set <key> <value>
//! phpdev detect <path> [--json]
//! phpdev frameworks [--json]
//! ```
//!
//! Everything except `detect`, `frameworks` and `daemon start` talks to the
//! daemon over its Unix socket.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, detect::DetectArgs, detect::FrameworksArgs,
    php::PhpCommand, project::ProjectCommand, server::ServerCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "phpdev",
    version,
    about = "Run PHP projects locally with managed PHP binaries",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or query the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Manage cached PHP binaries.
    Php {
        #[command(subcommand)]
        command: PhpCommand,
    },

    /// Manage registered projects.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Start, stop and inspect development servers.
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },

    /// Show or change settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Detect the framework of a directory (no daemon needed).
    Detect(DetectArgs),

    /// List supported frameworks and their defaults.
    Frameworks(FrameworksArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Php { command } => commands::php::run(command),
        Commands::Project { command } => commands::project::run(command),
        Commands::Server { command } => commands::server::run(command),
        Commands::Config { command } => commands::config::run(command),
        Commands::Detect(args) => args.run(),
        Commands::Frameworks(args) => args.run(),
    }
}
