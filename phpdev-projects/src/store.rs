//! In-memory project registry mirrored to `~/.phpdev/projects.yaml`.
//!
//! Every mutation persists the whole map while holding the write lock and
//! only commits to memory once the file write succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use phpdev_core::registry::{load_projects_at, save_projects_at};
use phpdev_core::{Framework, ProjectInfo, ProjectName};
use phpdev_detector::{detect, php_requirement, resolve_entry_point};
use tracing::info;

use crate::error::ImportError;

#[derive(Debug)]
pub struct ProjectStore {
    home: PathBuf,
    projects: RwLock<BTreeMap<ProjectName, ProjectInfo>>,
}

impl ProjectStore {
    pub fn open_at(home: &Path) -> Result<Self, ImportError> {
        let projects = load_projects_at(home)?
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Ok(Self {
            home: home.to_path_buf(),
            projects: RwLock::new(projects),
        })
    }

    /// All registered projects, ordered by name.
    pub fn list(&self) -> Vec<ProjectInfo> {
        self.read().values().cloned().collect()
    }

    pub fn get(&self, name: &ProjectName) -> Option<ProjectInfo> {
        self.read().get(name).cloned()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<ProjectInfo> {
        let wanted = normalize(path);
        self.read()
            .values()
            .find(|p| normalize(&p.path) == wanted)
            .cloned()
    }

    /// Register an existing directory. `name` defaults to its final component.
    pub fn add(&self, path: &Path, name: Option<&str>) -> Result<ProjectInfo, ImportError> {
        if !path.is_dir() {
            return Err(ImportError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        let path = normalize(path);
        let name = match name {
            Some(n) => n.trim().to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        check_name(&name)?;

        let project = inspect_project(&path, ProjectName::from(name), None)?;
        self.insert(project.clone())?;
        Ok(project)
    }

    /// Add `project`, failing if the name is taken.
    pub fn insert(&self, project: ProjectInfo) -> Result<(), ImportError> {
        let mut projects = self.write();
        if projects.contains_key(&project.name) {
            return Err(ImportError::DuplicateName { name: project.name });
        }
        let mut next = projects.clone();
        next.insert(project.name.clone(), project.clone());
        self.persist(&next)?;
        *projects = next;
        info!(project = %project.name, path = %project.path.display(), "registered project");
        Ok(())
    }

    /// Drop the registry entry. Files on disk are left untouched.
    pub fn remove(&self, name: &ProjectName) -> Result<ProjectInfo, ImportError> {
        let mut projects = self.write();
        let mut next = projects.clone();
        let removed = next
            .remove(name)
            .ok_or_else(|| ImportError::UnknownProject { name: name.clone() })?;
        self.persist(&next)?;
        *projects = next;
        info!(project = %name, "unregistered project");
        Ok(removed)
    }

    /// The registered project at `path`, or a fresh inspection if unregistered.
    pub fn get_info(&self, path: &Path) -> Result<ProjectInfo, ImportError> {
        if let Some(project) = self.find_by_path(path) {
            return Ok(project);
        }
        if !path.is_dir() {
            return Err(ImportError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        let path = normalize(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        inspect_project(&path, ProjectName::from(name), None)
    }

    fn persist(&self, projects: &BTreeMap<ProjectName, ProjectInfo>) -> Result<(), ImportError> {
        let list: Vec<ProjectInfo> = projects.values().cloned().collect();
        save_projects_at(&self.home, &list)?;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<ProjectName, ProjectInfo>> {
        self.projects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<ProjectName, ProjectInfo>> {
        self.projects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Detect framework, entry point and PHP requirement for the tree at `path`.
pub fn inspect_project(
    path: &Path,
    name: ProjectName,
    git_url: Option<String>,
) -> Result<ProjectInfo, ImportError> {
    let framework = detect(path)?;
    let entry_point = resolve_entry_point(path, framework);
    let known = framework != Framework::Unknown;
    Ok(ProjectInfo {
        name,
        path: path.to_path_buf(),
        framework: known.then_some(framework),
        git_url,
        php_version: php_requirement(path),
        entry_point: (known || path.join(&entry_point).is_file()).then_some(entry_point),
    })
}

pub(crate) fn check_name(name: &str) -> Result<(), ImportError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(ImportError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn names_are_validated() {
        for bad in ["", ".", "..", "a/b", "a\\b", "tab\there"] {
            assert!(check_name(bad).is_err(), "{bad:?}");
        }
        assert!(check_name("shop-api").is_ok());
    }

    #[test]
    fn unknown_tree_has_no_framework() {
        let dir = TempDir::new().unwrap();
        let info = inspect_project(dir.path(), "x".into(), None).unwrap();
        assert_eq!(info.framework, None);
        assert_eq!(info.entry_point, None);
    }
}
