//! `phpdev project`: registry and imports.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use phpdev_core::{CloneProjectRequest, ProjectInfo};
use phpdev_daemon::DaemonRequest;
use phpdev_projects::CloneOutcome;

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// List registered projects.
    List(JsonArg),
    /// Register an existing directory.
    Add(AddArgs),
    /// Forget a project. Files on disk are left alone.
    Remove { name: String },
    /// Clone a Git repository and register it.
    Clone(CloneArgs),
    /// Inspect a directory without registering it.
    Info {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct JsonArg {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub path: PathBuf,

    /// Registry name. Defaults to the directory name.
    #[arg(long, short = 'n')]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct CloneArgs {
    pub url: String,

    /// Clone into this directory instead of `<projects_dir>/<name>`.
    #[arg(long, short = 'd')]
    pub dest: Option<PathBuf>,

    #[arg(long, short = 'b')]
    pub branch: Option<String>,

    /// Run the framework's setup commands after cloning.
    #[arg(long)]
    pub setup: bool,
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "framework")]
    framework: String,
    #[tabled(rename = "php")]
    php: String,
    #[tabled(rename = "path")]
    path: String,
}

pub fn run(command: ProjectCommand) -> Result<()> {
    let home = super::home()?;

    match command {
        ProjectCommand::List(args) => {
            let projects: Vec<ProjectInfo> = super::call(&home, DaemonRequest::ListProjects)?;
            if args.json {
                return super::print_json(&projects);
            }
            if projects.is_empty() {
                println!("No projects registered.");
                println!("Run: phpdev project add <path>");
                return Ok(());
            }
            let rows: Vec<ProjectRow> = projects
                .into_iter()
                .map(|p| ProjectRow {
                    name: p.name.to_string(),
                    framework: super::or_dash(p.framework),
                    php: super::or_dash(p.php_version),
                    path: p.path.display().to_string(),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        ProjectCommand::Add(args) => {
            let project: ProjectInfo = super::call(
                &home,
                DaemonRequest::AddProject {
                    path: super::absolute(&args.path)?,
                    name: args.name,
                },
            )
            .with_context(|| format!("failed to add {}", args.path.display()))?;
            println!(
                "{} Added '{}' ({})",
                "✓".green(),
                project.name,
                super::or_dash(project.framework)
            );
        }
        ProjectCommand::Remove { name } => {
            let project: ProjectInfo =
                super::call(&home, DaemonRequest::RemoveProject { name })?;
            println!("{} Removed '{}'", "✓".green(), project.name);
        }
        ProjectCommand::Clone(args) => {
            let dest = args.dest.as_deref().map(super::absolute).transpose()?;
            let outcome: CloneOutcome = super::call(
                &home,
                DaemonRequest::CloneProject {
                    request: CloneProjectRequest {
                        git_url: args.url.clone(),
                        destination: dest,
                        branch: args.branch,
                        auto_setup: args.setup,
                    },
                },
            )
            .with_context(|| format!("failed to clone {}", args.url))?;
            println!(
                "{} Cloned '{}' into {} ({})",
                "✓".green(),
                outcome.project.name,
                outcome.project.path.display(),
                super::or_dash(outcome.project.framework)
            );
            for failure in &outcome.setup_failures {
                println!(
                    "{} setup step `{}` failed: {}",
                    "!".yellow().bold(),
                    failure.command,
                    failure.reason
                );
            }
        }
        ProjectCommand::Info { path, json } => {
            let project: ProjectInfo = super::call(
                &home,
                DaemonRequest::GetProjectInfo {
                    path: super::absolute(&path)?,
                },
            )?;
            if json {
                return super::print_json(&project);
            }
            println!("{}", project.name.to_string().bold());
            println!("  path:        {}", project.path.display());
            println!("  framework:   {}", super::or_dash(project.framework));
            println!("  entry point: {}", super::or_dash(project.entry_point));
            println!("  php:         {}", super::or_dash(project.php_version));
            if let Some(url) = project.git_url {
                println!("  git:         {url}");
            }
        }
    }

    Ok(())
}
