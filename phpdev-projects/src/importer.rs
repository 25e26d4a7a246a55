//! Git import: clone → detect → optional setup → register.
//!
//! A failed clone, or a clone that cannot be registered, removes whatever it
//! created. A failed setup command is reported in
//! [`CloneOutcome::setup_failures`] but never rolls back the clone.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use phpdev_core::{CloneProjectRequest, ConfigStore, Framework, ProjectInfo, ProjectName};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{io_err, ImportError};
use crate::git::GitCloner;
use crate::setup::SetupRunner;
use crate::store::{check_name, inspect_project, ProjectStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupFailure {
    pub command: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOutcome {
    pub project: ProjectInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup_failures: Vec<SetupFailure>,
}

pub struct Importer {
    home: PathBuf,
    config: Arc<ConfigStore>,
    store: Arc<ProjectStore>,
    git: Arc<dyn GitCloner>,
    setup: Arc<dyn SetupRunner>,
    in_flight: Arc<Mutex<HashSet<ProjectName>>>,
}

/// Holds a project name for the duration of one clone.
struct NameClaim {
    name: ProjectName,
    in_flight: Arc<Mutex<HashSet<ProjectName>>>,
}

impl Drop for NameClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

impl Importer {
    pub fn new(
        home: PathBuf,
        config: Arc<ConfigStore>,
        store: Arc<ProjectStore>,
        git: Arc<dyn GitCloner>,
        setup: Arc<dyn SetupRunner>,
    ) -> Self {
        Self {
            home,
            config,
            store,
            git,
            setup,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub async fn clone_project(
        &self,
        request: CloneProjectRequest,
    ) -> Result<CloneOutcome, ImportError> {
        let url = request.git_url.trim().to_string();
        let name = ProjectName::from(project_name_from_url(&url)?);
        let _claim = self.claim(&name)?;

        let dest = request
            .destination
            .clone()
            .unwrap_or_else(|| self.config.projects_dir(&self.home).join(&name.0));
        let existed = dest.exists();
        if existed && !is_empty_dir(&dest)? {
            return Err(ImportError::DestinationExists { path: dest });
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        info!(url = %url, dest = %dest.display(), "cloning project");
        let git = Arc::clone(&self.git);
        let (clone_url, clone_dest, branch) = (url.clone(), dest.clone(), request.branch.clone());
        let cloned = tokio::task::spawn_blocking(move || {
            git.clone_repo(&clone_url, &clone_dest, branch.as_deref())
        })
        .await?;
        if let Err(err) = cloned {
            warn!(url = %url, error = %err, "clone failed; cleaning up");
            discard_clone(&dest, existed);
            return Err(err);
        }

        match self.register_clone(&dest, name, url, request.auto_setup).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(dest = %dest.display(), error = %err, "import failed; removing clone");
                discard_clone(&dest, existed);
                Err(err)
            }
        }
    }

    async fn register_clone(
        &self,
        dest: &Path,
        name: ProjectName,
        url: String,
        auto_setup: bool,
    ) -> Result<CloneOutcome, ImportError> {
        let project = inspect_project(dest, name, Some(url))?;
        let setup_failures = match (auto_setup, project.framework) {
            (true, Some(framework)) => self.run_setup(framework, dest).await?,
            _ => Vec::new(),
        };
        self.store.insert(project.clone())?;
        Ok(CloneOutcome {
            project,
            setup_failures,
        })
    }

    async fn run_setup(
        &self,
        framework: Framework,
        dir: &Path,
    ) -> Result<Vec<SetupFailure>, ImportError> {
        let commands = framework.setup_commands();
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let runner = Arc::clone(&self.setup);
        let cwd = dir.to_path_buf();
        let failures = tokio::task::spawn_blocking(move || {
            let mut failures = Vec::new();
            for command in commands {
                match runner.run(command, &cwd) {
                    Ok(()) => info!(command, "setup command succeeded"),
                    Err(reason) => {
                        warn!(command, reason = %reason, "setup command failed");
                        failures.push(SetupFailure {
                            command: command.to_string(),
                            reason,
                        });
                    }
                }
            }
            failures
        })
        .await?;
        Ok(failures)
    }

    fn claim(&self, name: &ProjectName) -> Result<NameClaim, ImportError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if self.store.get(name).is_some() || !in_flight.insert(name.clone()) {
            return Err(ImportError::DuplicateName { name: name.clone() });
        }
        Ok(NameClaim {
            name: name.clone(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

/// Final path segment of a Git URL, minus `.git`.
///
/// Handles `https://host/user/repo.git`, `git@host:user/repo.git` and
/// local paths.
pub fn project_name_from_url(url: &str) -> Result<String, ImportError> {
    let invalid = || ImportError::InvalidUrl {
        url: url.to_string(),
    };
    let trimmed = url.trim();
    let without_suffix = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let path_part = match without_suffix.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or_default(),
        None => without_suffix,
    };
    let last = path_part
        .rsplit(['/', ':', '\\'])
        .next()
        .ok_or_else(invalid)?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    check_name(name).map_err(|_| invalid())?;
    Ok(name.to_string())
}

fn is_empty_dir(path: &Path) -> Result<bool, ImportError> {
    if !path.is_dir() {
        return Ok(false);
    }
    let mut entries = std::fs::read_dir(path).map_err(|e| io_err(path, e))?;
    Ok(entries.next().is_none())
}

fn discard_clone(dest: &Path, existed: bool) {
    if !existed {
        let _ = std::fs::remove_dir_all(dest);
        return;
    }
    if let Ok(entries) = std::fs::read_dir(dest) {
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let _ = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
        }
    }
}
