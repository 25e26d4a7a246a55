//! Framework detection for `phpdev-detector`.
//!
//! `detect(path)` inspects marker files in a project root and classifies the
//! PHP framework. Checks run in a fixed priority order, most specific first:
//! Lumen is tested before Laravel because a Lumen tree also carries Laravel
//! markers, and the generic `Plain` check runs last.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use phpdev_core::{ErrorKind, Framework, FrameworkInfo};
use thiserror::Error;
use tracing::warn;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Errors from framework detection.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("'{path}' is not an existing directory")]
    NotADirectory { path: PathBuf },
}

impl DetectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectError::Io(_) => ErrorKind::Io,
            DetectError::NotADirectory { .. } => ErrorKind::NotFound,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Classify the project rooted at `path`.
///
/// Returns [`Framework::Unknown`] when no marker matches and
/// [`Framework::Plain`] when only loose PHP files are present.
pub fn detect(path: &Path) -> Result<Framework, DetectError> {
    if !path.is_dir() {
        return Err(DetectError::NotADirectory { path: path.to_path_buf() });
    }
    let deps = composer_deps(path)?;
    let project = Project { root: path, deps: &deps };

    let checks: [(Framework, fn(&Project) -> bool); 10] = [
        (Framework::Lumen, is_lumen),
        (Framework::Laravel, is_laravel),
        (Framework::Symfony, is_symfony),
        (Framework::CakePHP, is_cakephp),
        (Framework::Yii, is_yii),
        (Framework::Zend, is_zend),
        (Framework::ThinkPHP, is_thinkphp),
        (Framework::Phalcon, is_phalcon),
        (Framework::Slim, is_slim),
        (Framework::CodeIgniter, is_codeigniter),
    ];
    for (framework, check) in checks {
        if check(&project) {
            return Ok(framework);
        }
    }

    if is_plain_php(path) {
        return Ok(Framework::Plain);
    }
    Ok(Framework::Unknown)
}

/// Static facts for `framework`.
pub fn framework_info(framework: Framework) -> FrameworkInfo {
    framework.info()
}

/// `true` iff `path` exists and is a readable directory. Never errors.
pub fn validate_path(path: &Path) -> bool {
    path.is_dir() && fs::read_dir(path).is_ok()
}

/// Entry point actually present for `framework` under `path`.
///
/// Prefers the framework default; falls back to the first conventional front
/// controller found on disk, then to the default even if it is missing.
pub fn resolve_entry_point(path: &Path, framework: Framework) -> String {
    let default = framework.default_entry_point();
    if path.join(default).is_file() {
        return default.to_string();
    }
    ["public/index.php", "index.php", "web/index.php", "webroot/index.php"]
        .into_iter()
        .find(|candidate| path.join(candidate).is_file())
        .unwrap_or(default)
        .to_string()
}

/// PHP version required by `composer.json` (`require.php`), as `MAJOR.MINOR.0`.
///
/// `None` when there is no composer file, no php constraint, or it cannot be read.
pub fn php_requirement(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path.join("composer.json")).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    let constraint = json.get("require")?.get("php")?.as_str()?;
    parse_php_constraint(constraint)
}

/// Lowest `MAJOR.MINOR.0` a composer constraint admits, e.g. `^8.2` → `8.2.0`.
pub fn parse_php_constraint(constraint: &str) -> Option<String> {
    constraint
        .split(['|', ','])
        .filter_map(|alternative| {
            let token = alternative.split_whitespace().next()?;
            let token = token.trim_start_matches(['^', '~', '>', '=', 'v', 'V']);
            let mut parts = token.split('.');
            let major: u32 = parts.next()?.parse().ok()?;
            let minor: u32 = match parts.next() {
                Some("*") | Some("x") | None => 0,
                Some(m) => m.parse().ok()?,
            };
            Some((major, minor))
        })
        .min()
        .map(|(major, minor)| format!("{major}.{minor}.0"))
}

// ---------------------------------------------------------------------------
// Framework checks
// ---------------------------------------------------------------------------

struct Project<'a> {
    root: &'a Path,
    deps: &'a HashSet<String>,
}

impl Project<'_> {
    fn has(&self, rel: &str) -> bool {
        self.root.join(rel).exists()
    }

    fn dep(&self, name: &str) -> bool {
        self.deps.contains(name)
    }

    fn dep_prefix(&self, prefix: &str) -> bool {
        self.deps.iter().any(|d| d.starts_with(prefix))
    }

    fn contains(&self, rel: &str, needle: &str) -> bool {
        fs::read_to_string(self.root.join(rel))
            .map(|content| content.contains(needle))
            .unwrap_or(false)
    }
}

fn is_lumen(p: &Project) -> bool {
    p.dep("laravel/lumen-framework") || p.contains("bootstrap/app.php", "Laravel\\Lumen")
}

fn is_laravel(p: &Project) -> bool {
    p.dep("laravel/framework") || p.has("artisan")
}

fn is_symfony(p: &Project) -> bool {
    p.dep("symfony/framework-bundle")
        || p.dep("symfony/symfony")
        || p.has("symfony.lock")
        || (p.has("bin/console") && p.has("src/Kernel.php"))
}

fn is_cakephp(p: &Project) -> bool {
    p.dep("cakephp/cakephp")
        || p.has("bin/cake")
        || (p.has("webroot/index.php") && p.has("src/Application.php"))
}

fn is_yii(p: &Project) -> bool {
    p.dep("yiisoft/yii2") || (p.has("yii") && p.has("web/index.php"))
}

fn is_zend(p: &Project) -> bool {
    p.dep_prefix("laminas/")
        || p.dep_prefix("zendframework/")
        || p.has("config/application.config.php")
        || p.has("config/modules.config.php")
}

fn is_thinkphp(p: &Project) -> bool {
    p.dep_prefix("topthink/")
        || p.contains("think", "think\\Console")
        || p.contains("public/index.php", "think\\App")
        || (p.has("ThinkPHP") && p.has("Application"))
}

fn is_phalcon(p: &Project) -> bool {
    p.dep_prefix("phalcon/")
        || p.contains("public/index.php", "Phalcon")
        || p.contains("app/config/config.php", "Phalcon")
}

fn is_slim(p: &Project) -> bool {
    p.dep("slim/slim") || p.contains("public/index.php", "Slim\\")
}

fn is_codeigniter(p: &Project) -> bool {
    p.dep("codeigniter4/framework")
        || p.has("system/CodeIgniter.php")
        || p.has("application/config/config.php")
        || (p.has("spark") && p.has("app/Config/App.php"))
}

fn is_plain_php(root: &Path) -> bool {
    if root.join("public/index.php").is_file() {
        return true;
    }
    fs::read_dir(root)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                let path = e.path();
                path.is_file() && path.extension().is_some_and(|ext| ext == "php")
            })
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

/// Package names from `require` and `require-dev`.
///
/// Empty without composer.json or when it does not parse; marker files still
/// decide the framework in that case.
fn composer_deps(root: &Path) -> Result<HashSet<String>, DetectError> {
    let file = root.join("composer.json");
    if !file.is_file() {
        return Ok(HashSet::new());
    }
    let content = fs::read_to_string(&file)?;
    let json: serde_json::Value = match serde_json::from_str(&content) {
        Ok(json) => json,
        Err(err) => {
            warn!(path = %file.display(), error = %err, "ignoring unparseable composer.json");
            return Ok(HashSet::new());
        }
    };

    let mut deps = HashSet::new();
    for key in ["require", "require-dev"] {
        if let Some(obj) = json.get(key).and_then(|v| v.as_object()) {
            deps.extend(obj.keys().map(|k| k.to_ascii_lowercase()));
        }
    }
    Ok(deps)
}
