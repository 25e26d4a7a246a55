//! `phpdev detect` and `phpdev frameworks`, answered locally.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use phpdev_core::{Framework, FrameworkInfo};

#[derive(Args, Debug)]
pub struct DetectArgs {
    pub path: PathBuf,

    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Detection {
    path: PathBuf,
    framework: Framework,
    entry_point: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    php_version: Option<String>,
}

impl DetectArgs {
    pub fn run(self) -> Result<()> {
        if !phpdev_detector::validate_path(&self.path) {
            bail!("{} is not a readable directory", self.path.display());
        }
        let framework = phpdev_detector::detect(&self.path)
            .with_context(|| format!("failed to inspect {}", self.path.display()))?;
        let detection = Detection {
            entry_point: phpdev_detector::resolve_entry_point(&self.path, framework),
            php_version: phpdev_detector::php_requirement(&self.path),
            path: self.path,
            framework,
        };

        if self.json {
            return super::print_json(&detection);
        }
        println!("{}", detection.framework.to_string().bold());
        println!("  entry point: {}", detection.entry_point);
        println!("  php:         {}", super::or_dash(detection.php_version));
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct FrameworksArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct FrameworkRow {
    #[tabled(rename = "framework")]
    name: String,
    #[tabled(rename = "entry point")]
    entry_point: String,
    #[tabled(rename = "port")]
    port: u16,
    #[tabled(rename = "composer")]
    composer: String,
    #[tabled(rename = "setup")]
    setup: String,
}

impl FrameworksArgs {
    pub fn run(self) -> Result<()> {
        let infos: Vec<FrameworkInfo> = Framework::ALL
            .iter()
            .map(|fw| phpdev_detector::framework_info(*fw))
            .collect();
        if self.json {
            return super::print_json(&infos);
        }
        let rows: Vec<FrameworkRow> = infos
            .into_iter()
            .map(|info| FrameworkRow {
                name: info.name,
                entry_point: info.default_entry_point,
                port: info.default_port,
                composer: if info.requires_composer { "yes" } else { "no" }.to_string(),
                setup: if info.setup_commands.is_empty() {
                    "-".to_string()
                } else {
                    info.setup_commands.join(" && ")
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
