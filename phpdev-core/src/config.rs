//! The process-wide configuration store.
//!
//! `get` hands out a clone of the in-memory value; `set` validates, persists
//! and only then swaps, all under the write lock, so readers observe either
//! the old or the new config and never a value that failed to persist.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::error::StoreError;
use crate::paths::{config_path, default_projects_dir};
use crate::registry::{read_yaml, write_yaml_atomic};
use crate::types::{parse_version, Config};

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Config>,
}

impl ConfigStore {
    /// Load `<home>/.phpdev/config.yaml`, falling back to defaults if absent.
    pub fn open_at(home: &Path) -> Result<Self, StoreError> {
        Self::open(config_path(home))
    }

    /// Load the config stored at `path`, falling back to defaults if absent.
    ///
    /// A present but malformed file is an error, never silently replaced.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let config = read_yaml::<Config>(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            current: RwLock::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Config {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole configuration. Persisted before returning.
    pub fn set(&self, config: Config) -> Result<(), StoreError> {
        validate(&config)?;
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        write_yaml_atomic(&self.path, &config)?;
        *guard = config;
        Ok(())
    }

    /// Configured projects directory, or `<home>/phpdev-projects`.
    pub fn projects_dir(&self, home: &Path) -> PathBuf {
        self.get()
            .projects_dir
            .unwrap_or_else(|| default_projects_dir(home))
    }
}

fn validate(config: &Config) -> Result<(), StoreError> {
    if config.download_base_url.trim().is_empty() {
        return Err(StoreError::Invalid("download_base_url is empty".into()));
    }
    if let Some(bad) = config
        .php_versions
        .iter()
        .find(|v| parse_version(v).is_none())
    {
        return Err(StoreError::Invalid(format!(
            "php version '{bad}' is not MAJOR.MINOR.PATCH"
        )));
    }
    if let Some(default) = &config.default_php_version {
        if parse_version(default).is_none() {
            return Err(StoreError::Invalid(format!(
                "default php version '{default}' is not MAJOR.MINOR.PATCH"
            )));
        }
    }
    if config.server.default_port == 0 {
        return Err(StoreError::Invalid("server.default_port must be non-zero".into()));
    }
    if config.server.default_host.trim().is_empty() {
        return Err(StoreError::Invalid("server.default_host is empty".into()));
    }
    Ok(())
}
