//! `phpdev config`: read and edit settings through the daemon.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;

use phpdev_core::{parse_version, Config};
use phpdev_daemon::DaemonRequest;

/// Keys accepted by `phpdev config set`.
pub const KEYS: &[&str] = &[
    "php_versions",
    "default_php_version",
    "download_base_url",
    "projects_dir",
    "server.default_port",
    "server.default_host",
    "server.auto_reload",
    "server.document_root",
];

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the current settings.
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Change one setting. `none` clears optional keys.
    Set { key: String, value: String },
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = super::home()?;
    let config: Config = super::call(&home, DaemonRequest::GetConfig)?;

    match command {
        ConfigCommand::Show { json } => {
            if json {
                return super::print_json(&config);
            }
            for (key, value) in entries(&config) {
                println!("{:<22} {}", key.bold(), value);
            }
        }
        ConfigCommand::Set { key, value } => {
            let updated = apply(config, &key, &value)?;
            let _: Value = super::call(&home, DaemonRequest::SetConfig { config: updated })
                .with_context(|| format!("failed to set {key}"))?;
            println!("{} {key} = {value}", "✓".green());
        }
    }

    Ok(())
}

fn entries(config: &Config) -> Vec<(&'static str, String)> {
    vec![
        ("php_versions", config.php_versions.join(", ")),
        (
            "default_php_version",
            super::or_dash(config.default_php_version.as_deref()),
        ),
        ("download_base_url", config.download_base_url.clone()),
        (
            "projects_dir",
            super::or_dash(config.projects_dir.as_ref().map(|p| p.display().to_string())),
        ),
        ("server.default_port", config.server.default_port.to_string()),
        ("server.default_host", config.server.default_host.clone()),
        ("server.auto_reload", config.server.auto_reload.to_string()),
        (
            "server.document_root",
            super::or_dash(
                config
                    .server
                    .document_root
                    .as_ref()
                    .map(|p| p.display().to_string()),
            ),
        ),
    ]
}

fn apply(mut config: Config, key: &str, value: &str) -> Result<Config> {
    let cleared = value.eq_ignore_ascii_case("none") || value.is_empty();
    match key {
        "php_versions" => {
            let versions: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            for v in &versions {
                check_version(v)?;
            }
            config.php_versions = versions;
        }
        "default_php_version" if cleared => config.default_php_version = None,
        "default_php_version" => {
            check_version(value)?;
            config.default_php_version = Some(value.to_string());
        }
        "download_base_url" => {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                bail!("download_base_url must be an http(s) URL");
            }
            config.download_base_url = value.trim_end_matches('/').to_string();
        }
        "projects_dir" if cleared => config.projects_dir = None,
        "projects_dir" => config.projects_dir = Some(super::absolute(&PathBuf::from(value))?),
        "server.default_port" => {
            config.server.default_port = match value.parse::<u16>() {
                Ok(0) | Err(_) => bail!("server.default_port must be 1-65535"),
                Ok(port) => port,
            }
        }
        "server.default_host" => {
            if cleared {
                bail!("server.default_host cannot be empty");
            }
            config.server.default_host = value.to_string();
        }
        "server.auto_reload" => {
            config.server.auto_reload = value
                .parse::<bool>()
                .context("server.auto_reload must be true or false")?;
        }
        "server.document_root" if cleared => config.server.document_root = None,
        "server.document_root" => config.server.document_root = Some(PathBuf::from(value)),
        other => bail!("unknown key '{other}'; expected one of: {}", KEYS.join(", ")),
    }
    Ok(config)
}

fn check_version(version: &str) -> Result<()> {
    if parse_version(version).is_none() {
        bail!("'{version}' is not a MAJOR.MINOR.PATCH version");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_nested_and_optional_keys() {
        let config = Config::default();
        let config = apply(config, "server.default_port", "9000").unwrap();
        let config = apply(config, "server.document_root", "public").unwrap();
        let config = apply(config, "php_versions", "8.3.0, 8.2.0").unwrap();
        assert_eq!(config.server.default_port, 9000);
        assert_eq!(config.server.document_root, Some(PathBuf::from("public")));
        assert_eq!(config.php_versions, vec!["8.3.0", "8.2.0"]);

        let config = apply(config, "server.document_root", "none").unwrap();
        let config = apply(config, "default_php_version", "none").unwrap();
        assert_eq!(config.server.document_root, None);
        assert_eq!(config.default_php_version, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(apply(Config::default(), "server.default_port", "0").is_err());
        assert!(apply(Config::default(), "server.auto_reload", "maybe").is_err());
        assert!(apply(Config::default(), "default_php_version", "8.3").is_err());
        assert!(apply(Config::default(), "download_base_url", "ftp://x").is_err());
        assert!(apply(Config::default(), "colour", "blue").is_err());
    }
}
