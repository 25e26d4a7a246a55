//! Durable YAML state: the project registry file and the atomic write
//! primitive shared with the config store.
//!
//! Write flow: serialize → `<file>.tmp` sibling → `chmod 0600` → `rename`.
//! The `.tmp` always lives next to the target (same filesystem, no EXDEV).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::paths::{phpdev_root, projects_registry_path};
use crate::types::ProjectInfo;

pub const REGISTRY_VERSION: u32 = 1;

/// On-disk payload of `projects.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRegistryFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub projects: Vec<ProjectInfo>,
}

// ---------------------------------------------------------------------------
// Project registry
// ---------------------------------------------------------------------------

/// Load every registered project. A missing file is an empty registry.
pub fn load_projects_at(home: &Path) -> Result<Vec<ProjectInfo>, StoreError> {
    let path = projects_registry_path(home);
    Ok(read_yaml::<ProjectRegistryFile>(&path)?
        .map(|file| file.projects)
        .unwrap_or_default())
}

/// Replace the registry file with `projects`.
pub fn save_projects_at(home: &Path, projects: &[ProjectInfo]) -> Result<(), StoreError> {
    ensure_root(home)?;
    let file = ProjectRegistryFile {
        version: REGISTRY_VERSION,
        updated_at: Utc::now(),
        projects: projects.to_vec(),
    };
    write_yaml_atomic(&projects_registry_path(home), &file)
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Read and parse a YAML file; `Ok(None)` if it does not exist.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Atomically replace `path` with the YAML encoding of `value`.
pub fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let yaml = serde_yaml::to_string(value)?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, err));
    }
    Ok(())
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!("{name}.tmp"))
}

/// Create `~/.phpdev/` (mode `0700`) if absent.
pub fn ensure_root(home: &Path) -> Result<PathBuf, StoreError> {
    let dir = phpdev_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Framework, ProjectName};
    use tempfile::TempDir;

    fn project(name: &str) -> ProjectInfo {
        ProjectInfo {
            name: ProjectName::from(name),
            path: PathBuf::from(format!("/code/{name}")),
            framework: Some(Framework::Laravel),
            git_url: None,
            php_version: Some("8.2.0".into()),
            entry_point: Some("public/index.php".into()),
        }
    }

    #[test]
    fn missing_registry_is_empty() {
        let home = TempDir::new().expect("tempdir");
        assert!(load_projects_at(home.path()).expect("load").is_empty());
    }

    #[test]
    fn save_and_load_projects_roundtrip() {
        let home = TempDir::new().expect("tempdir");
        let projects = vec![project("shop"), project("blog")];
        save_projects_at(home.path(), &projects).expect("save");
        assert_eq!(load_projects_at(home.path()).expect("load"), projects);
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = TempDir::new().expect("tempdir");
        save_projects_at(home.path(), &[project("shop")]).expect("save");
        let tmp = tmp_path(&projects_registry_path(home.path()));
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn root_created_with_perms() {
        let home = TempDir::new().expect("tempdir");
        let dir = ensure_root(home.path()).expect("ensure_root");
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn corrupt_file_reports_path() {
        let home = TempDir::new().expect("tempdir");
        ensure_root(home.path()).expect("root");
        std::fs::write(projects_registry_path(home.path()), "projects: [unclosed").unwrap();
        let err = load_projects_at(home.path()).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("projects.yaml"));
    }
}
