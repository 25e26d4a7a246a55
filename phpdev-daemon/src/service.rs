//! `PhpEnv`: one object exposing every operation of the environment.
//!
//! Owns the config store, binary cache, project registry, importer and
//! server orchestrator for one `home`. The daemon protocol dispatches onto
//! it; tests drive it directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use phpdev_binaries::{BinaryError, Fetcher, UreqFetcher, VersionManager};
use phpdev_core::paths::binaries_dir;
use phpdev_core::registry::ensure_root;
use phpdev_core::{
    CloneProjectRequest, Config, ConfigStore, Framework, FrameworkInfo, PhpBinary, ProjectInfo,
    ProjectName, ServerId, ServerStatus, StartServerRequest, StoreError,
};
use phpdev_detector::DetectError;
use phpdev_projects::{
    CloneOutcome, GitCli, GitCloner, ImportError, Importer, ProjectStore, SetupRunner, ShellRunner,
};

use crate::error::{DaemonError, ServerError};
use crate::orchestrator::ServerManager;

/// Swappable external collaborators.
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub git: Arc<dyn GitCloner>,
    pub setup: Arc<dyn SetupRunner>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            fetcher: Arc::new(UreqFetcher::new()),
            git: Arc::new(GitCli),
            setup: Arc::new(ShellRunner),
        }
    }
}

pub struct PhpEnv {
    home: PathBuf,
    config: Arc<ConfigStore>,
    versions: Arc<VersionManager>,
    projects: Arc<ProjectStore>,
    importer: Importer,
    servers: ServerManager,
}

impl PhpEnv {
    /// Open the environment rooted at `home` with real collaborators.
    pub fn open(home: &Path) -> Result<Self, DaemonError> {
        Self::with_collaborators(home, Collaborators::default())
    }

    pub fn with_collaborators(home: &Path, with: Collaborators) -> Result<Self, DaemonError> {
        ensure_root(home)?;
        let config = Arc::new(ConfigStore::open_at(home)?);
        let projects = Arc::new(ProjectStore::open_at(home)?);
        let versions = Arc::new(VersionManager::new(
            binaries_dir(home),
            Arc::clone(&config),
            with.fetcher,
        ));
        let importer = Importer::new(
            home.to_path_buf(),
            Arc::clone(&config),
            Arc::clone(&projects),
            with.git,
            with.setup,
        );
        let servers = ServerManager::new(
            Arc::clone(&config),
            Arc::clone(&versions),
            Arc::clone(&projects),
        );
        Ok(Self {
            home: home.to_path_buf(),
            config,
            versions,
            projects,
            importer,
            servers,
        })
    }

    /// Grace period a stopping server gets before SIGKILL.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.servers = self.servers.with_stop_timeout(timeout);
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    // -----------------------------------------------------------------------
    // Config
    // -----------------------------------------------------------------------

    pub fn get_config(&self) -> Config {
        self.config.get()
    }

    pub async fn set_config(&self, config: Config) -> Result<(), StoreError> {
        let store = Arc::clone(&self.config);
        match tokio::task::spawn_blocking(move || store.set(config)).await {
            Ok(result) => result,
            Err(join) => Err(StoreError::Io {
                path: self.config.path().to_path_buf(),
                source: std::io::Error::other(join.to_string()),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // PHP binaries
    // -----------------------------------------------------------------------

    pub async fn list_php_binaries(&self) -> Result<Vec<PhpBinary>, BinaryError> {
        self.versions.list().await
    }

    /// Resolve (download if needed) and describe `version`.
    pub async fn download_php_binary(&self, version: &str) -> Result<PhpBinary, BinaryError> {
        let path = self.versions.resolve(version).await?;
        let listed = self
            .versions
            .list()
            .await?
            .into_iter()
            .find(|b| b.version == version);
        Ok(listed.unwrap_or_else(|| PhpBinary {
            version: version.to_string(),
            size: std::fs::metadata(&path).ok().map(|m| m.len()),
            path: Some(path),
            download_url: None,
            downloaded: true,
        }))
    }

    pub async fn get_php_version(&self, version: &str) -> Result<String, BinaryError> {
        self.versions.get_version_string(version).await
    }

    pub async fn remove_php_binary(&self, version: &str) -> Result<(), BinaryError> {
        self.versions.remove(version).await
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub async fn clone_project(
        &self,
        request: CloneProjectRequest,
    ) -> Result<CloneOutcome, ImportError> {
        self.importer.clone_project(request).await
    }

    /// Register an existing directory. Inspection and the registry write run
    /// on the blocking pool.
    pub async fn add_project(
        &self,
        path: &Path,
        name: Option<&str>,
    ) -> Result<ProjectInfo, ImportError> {
        let store = Arc::clone(&self.projects);
        let (path, name) = (path.to_path_buf(), name.map(str::to_string));
        tokio::task::spawn_blocking(move || store.add(&path, name.as_deref())).await?
    }

    pub fn list_projects(&self) -> Vec<ProjectInfo> {
        self.projects.list()
    }

    pub async fn remove_project(&self, name: &str) -> Result<ProjectInfo, ImportError> {
        let store = Arc::clone(&self.projects);
        let name = ProjectName::from(name);
        tokio::task::spawn_blocking(move || store.remove(&name)).await?
    }

    pub async fn get_project_info(&self, path: &Path) -> Result<ProjectInfo, ImportError> {
        let store = Arc::clone(&self.projects);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || store.get_info(&path)).await?
    }

    pub fn detect_framework(&self, path: &Path) -> Result<Framework, DetectError> {
        phpdev_detector::detect(path)
    }

    pub fn get_framework_info(&self, framework: Framework) -> FrameworkInfo {
        phpdev_detector::framework_info(framework)
    }

    pub fn validate_project_path(&self, path: &Path) -> bool {
        phpdev_detector::validate_path(path)
    }

    // -----------------------------------------------------------------------
    // Servers
    // -----------------------------------------------------------------------

    pub async fn start_server(&self, request: StartServerRequest) -> Result<ServerId, ServerError> {
        self.servers.start(request).await
    }

    pub async fn stop_server(&self, id: &ServerId) -> Result<(), ServerError> {
        self.servers.stop(id).await
    }

    pub async fn stop_all_servers(&self) -> Result<usize, ServerError> {
        self.servers.stop_all().await
    }

    pub async fn get_server_status(&self, id: &ServerId) -> Result<ServerStatus, ServerError> {
        self.servers.status(id).await
    }

    pub async fn list_running_servers(&self) -> Vec<(ServerId, ServerStatus)> {
        self.servers.list().await
    }

    pub async fn get_server_logs(&self, id: &ServerId) -> Result<String, ServerError> {
        self.servers.logs(id).await
    }

    pub async fn find_available_port(&self, start_port: u16) -> Result<u16, ServerError> {
        self.servers.find_available_port(start_port).await
    }

    pub async fn running_server_count(&self) -> usize {
        self.servers.running_count().await
    }
}
