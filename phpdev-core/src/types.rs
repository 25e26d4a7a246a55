//! Domain types shared by every phpdev crate.
//!
//! All path fields use `PathBuf`; never `String` for filesystem paths.
//! Everything that crosses the daemon socket is serde-serializable.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of a live development server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Human-readable project name, unique within the project registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectName(pub String);

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Parse a `MAJOR.MINOR.PATCH` version string into its numeric parts.
///
/// Returns `None` for anything else (missing parts, signs, suffixes).
pub fn parse_version(version: &str) -> Option<[u32; 3]> {
    let mut parts = version.split('.');
    let mut out = [0u32; 3];
    for slot in out.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Framework
// ---------------------------------------------------------------------------

/// The PHP web frameworks phpdev knows how to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Framework {
    Laravel,
    Symfony,
    CodeIgniter,
    CakePHP,
    Zend,
    Yii,
    Phalcon,
    Slim,
    Lumen,
    ThinkPHP,
    Plain,
    Unknown,
}

/// Static facts about a framework, as returned by `framework_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub name: String,
    /// Front controller path relative to the project root.
    pub default_entry_point: String,
    pub requires_composer: bool,
    /// Commands run in order after a clone with auto-setup enabled.
    pub setup_commands: Vec<String>,
    pub default_port: u16,
}

impl Framework {
    pub const ALL: [Framework; 12] = [
        Framework::Laravel,
        Framework::Symfony,
        Framework::CodeIgniter,
        Framework::CakePHP,
        Framework::Zend,
        Framework::Yii,
        Framework::Phalcon,
        Framework::Slim,
        Framework::Lumen,
        Framework::ThinkPHP,
        Framework::Plain,
        Framework::Unknown,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Framework::Laravel => "Laravel",
            Framework::Symfony => "Symfony",
            Framework::CodeIgniter => "CodeIgniter",
            Framework::CakePHP => "CakePHP",
            Framework::Zend => "Zend/Laminas",
            Framework::Yii => "Yii",
            Framework::Phalcon => "Phalcon",
            Framework::Slim => "Slim",
            Framework::Lumen => "Lumen",
            Framework::ThinkPHP => "ThinkPHP",
            Framework::Plain => "Plain PHP",
            Framework::Unknown => "Unknown",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Framework::Laravel | Framework::Lumen => 8000,
            Framework::CakePHP => 8765,
            Framework::Symfony
            | Framework::CodeIgniter
            | Framework::Zend
            | Framework::Yii
            | Framework::Phalcon
            | Framework::Slim
            | Framework::ThinkPHP
            | Framework::Plain
            | Framework::Unknown => 8080,
        }
    }

    pub fn default_entry_point(self) -> &'static str {
        match self {
            Framework::Laravel
            | Framework::Symfony
            | Framework::Lumen
            | Framework::Phalcon
            | Framework::Slim
            | Framework::Zend
            | Framework::ThinkPHP => "public/index.php",
            Framework::CakePHP => "webroot/index.php",
            Framework::Yii => "web/index.php",
            Framework::CodeIgniter | Framework::Plain | Framework::Unknown => "index.php",
        }
    }

    pub fn requires_composer(self) -> bool {
        !matches!(
            self,
            Framework::CodeIgniter | Framework::Phalcon | Framework::Plain | Framework::Unknown
        )
    }

    pub fn setup_commands(self) -> &'static [&'static str] {
        match self {
            Framework::Laravel => &[
                "composer install",
                "cp .env.example .env",
                "php artisan key:generate",
            ],
            Framework::Symfony
            | Framework::CakePHP
            | Framework::Zend
            | Framework::Yii
            | Framework::Slim
            | Framework::Lumen
            | Framework::ThinkPHP => &["composer install"],
            Framework::CodeIgniter | Framework::Phalcon | Framework::Plain | Framework::Unknown => {
                &[]
            }
        }
    }

    pub fn info(self) -> FrameworkInfo {
        FrameworkInfo {
            name: self.display_name().to_string(),
            default_entry_point: self.default_entry_point().to_string(),
            requires_composer: self.requires_composer(),
            setup_commands: self.setup_commands().iter().map(|c| c.to_string()).collect(),
            default_port: self.default_port(),
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "laravel" => Ok(Framework::Laravel),
            "symfony" => Ok(Framework::Symfony),
            "codeigniter" | "ci" => Ok(Framework::CodeIgniter),
            "cakephp" | "cake" => Ok(Framework::CakePHP),
            "zend" | "laminas" | "zend/laminas" => Ok(Framework::Zend),
            "yii" | "yii2" => Ok(Framework::Yii),
            "phalcon" => Ok(Framework::Phalcon),
            "slim" => Ok(Framework::Slim),
            "lumen" => Ok(Framework::Lumen),
            "thinkphp" | "think" => Ok(Framework::ThinkPHP),
            "plain" | "plain php" | "php" => Ok(Framework::Plain),
            "unknown" => Ok(Framework::Unknown),
            other => Err(format!("unknown framework '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://github.com/NativePHP/php-bin/releases/download";

/// Process-wide settings, persisted as `~/.phpdev/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub php_versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_php_version: Option<String>,
    pub download_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_dir: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            php_versions: vec!["8.3.0".into(), "8.2.0".into(), "8.1.0".into()],
            default_php_version: Some("8.3.0".into()),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            projects_dir: None,
            server: ServerConfig::default(),
        }
    }
}

/// Defaults applied to every development server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub default_port: u16,
    pub default_host: String,
    pub auto_reload: bool,
    /// Document root override, relative to the project unless absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_root: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_port: 8000,
            default_host: "127.0.0.1".to_string(),
            auto_reload: true,
            document_root: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire structs
// ---------------------------------------------------------------------------

/// A PHP runtime version known to the binary cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhpBinary {
    pub version: String,
    /// Local executable, present only once downloaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub downloaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Point-in-time view of a tracked server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub port: u16,
    pub host: String,
    pub document_root: PathBuf,
    pub project_path: PathBuf,
    pub php_version: String,
    pub started_at: DateTime<Utc>,
}

/// A project known to the registry (or inspected ad hoc).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: ProjectName,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<Framework>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
    /// Front controller relative to `path`, e.g. `public/index.php`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartServerRequest {
    pub project_path: PathBuf,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub php_version: Option<String>,
    #[serde(default)]
    pub document_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneProjectRequest {
    pub git_url: String,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub auto_setup: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(ServerId::from("abc").to_string(), "abc");
        assert_eq!(ProjectName::from("shop").to_string(), "shop");
    }

    #[test]
    fn parse_version_accepts_triples_only() {
        assert_eq!(parse_version("8.3.0"), Some([8, 3, 0]));
        assert_eq!(parse_version("10.12.345"), Some([10, 12, 345]));
        assert_eq!(parse_version("8.3"), None);
        assert_eq!(parse_version("8.3.0.1"), None);
        assert_eq!(parse_version("8.x.0"), None);
        assert_eq!(parse_version("v8.3.0"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn framework_port_table() {
        assert_eq!(Framework::Laravel.default_port(), 8000);
        assert_eq!(Framework::Lumen.default_port(), 8000);
        assert_eq!(Framework::CakePHP.default_port(), 8765);
        for fw in Framework::ALL {
            if !matches!(fw, Framework::Laravel | Framework::Lumen | Framework::CakePHP) {
                assert_eq!(fw.default_port(), 8080, "{fw:?}");
            }
        }
    }

    #[test]
    fn framework_entry_point_table() {
        assert_eq!(Framework::CakePHP.default_entry_point(), "webroot/index.php");
        assert_eq!(Framework::Yii.default_entry_point(), "web/index.php");
        assert_eq!(Framework::CodeIgniter.default_entry_point(), "index.php");
        assert_eq!(Framework::Unknown.default_entry_point(), "index.php");
        assert_eq!(Framework::ThinkPHP.default_entry_point(), "public/index.php");
    }

    #[test]
    fn framework_from_str_is_case_insensitive() {
        assert_eq!("LARAVEL".parse::<Framework>(), Ok(Framework::Laravel));
        assert_eq!("laminas".parse::<Framework>(), Ok(Framework::Zend));
        assert!("rails".parse::<Framework>().is_err());
    }

    #[test]
    fn laravel_info_lists_setup_commands_in_order() {
        let info = Framework::Laravel.info();
        assert_eq!(info.name, "Laravel");
        assert!(info.requires_composer);
        assert_eq!(info.setup_commands[0], "composer install");
        assert_eq!(info.setup_commands.len(), 3);
    }

    #[test]
    fn config_default_values() {
        let config = Config::default();
        assert_eq!(config.php_versions, vec!["8.3.0", "8.2.0", "8.1.0"]);
        assert_eq!(config.default_php_version.as_deref(), Some("8.3.0"));
        assert_eq!(config.server.default_port, 8000);
        assert_eq!(config.server.default_host, "127.0.0.1");
        assert!(config.server.auto_reload);
        assert!(config.server.document_root.is_none());
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).expect("serialize");
        let back: Config = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(config, back);
    }
}
