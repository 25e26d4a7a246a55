//! Server process orchestrator.
//!
//! Locking:
//! - `Registry` behind a `tokio::sync::RwLock` is the structural lock. It
//!   guards the id → handle map and the `(host, port)` reservations, and is
//!   only held for map edits and port checks, never across a process wait.
//! - Each [`ServerHandle`] has its own `control` mutex guarding the stop
//!   request, so stopping one server never blocks status reads on another.
//!
//! Lifecycle: a port is reserved before spawn and released if spawn fails.
//! After a successful spawn the handle is inserted and a supervisor task
//! takes ownership of the child. The supervisor is the only code that
//! evicts: on natural exit or on a stop request it removes the entry,
//! frees the port, drops the binary lease and then flips `done`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use phpdev_binaries::{BinaryLease, VersionManager};
use phpdev_core::{
    ConfigStore, Framework, ProjectInfo, ServerConfig, ServerId, ServerStatus,
    StartServerRequest,
};
use phpdev_projects::ProjectStore;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, RwLock};
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::log_buffer::LogBuffer;
use crate::ports;

/// Default grace period between SIGTERM and SIGKILL.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Router script passed to the built-in server when present in the document root.
pub const ROUTER_SCRIPT: &str = "server.php";

#[derive(Default)]
struct Registry {
    instances: HashMap<ServerId, Arc<ServerHandle>>,
    reserved: HashSet<(String, u16)>,
}

impl Registry {
    fn port_taken(&self, port: u16) -> bool {
        self.reserved.iter().any(|(_, p)| *p == port)
    }
}

struct ServerHandle {
    id: ServerId,
    pid: Option<u32>,
    host: String,
    port: u16,
    document_root: PathBuf,
    project_path: PathBuf,
    php_version: String,
    started_at: DateTime<Utc>,
    logs: Arc<Mutex<LogBuffer>>,
    control: tokio::sync::Mutex<Option<oneshot::Sender<()>>>,
    done: watch::Receiver<bool>,
}

impl ServerHandle {
    fn status(&self) -> ServerStatus {
        let running = !*self.done.borrow();
        ServerStatus {
            running,
            pid: if running { self.pid } else { None },
            port: self.port,
            host: self.host.clone(),
            document_root: self.document_root.clone(),
            project_path: self.project_path.clone(),
            php_version: self.php_version.clone(),
            started_at: self.started_at,
        }
    }
}

/// Fully resolved launch parameters.
struct LaunchPlan {
    project_path: PathBuf,
    document_root: PathBuf,
    host: String,
    requested_port: Option<u16>,
    scan_from: u16,
    php_version: String,
    auto_reload: bool,
}

pub struct ServerManager {
    config: Arc<ConfigStore>,
    versions: Arc<VersionManager>,
    projects: Arc<ProjectStore>,
    registry: Arc<RwLock<Registry>>,
    stop_timeout: Duration,
}

impl ServerManager {
    pub fn new(
        config: Arc<ConfigStore>,
        versions: Arc<VersionManager>,
        projects: Arc<ProjectStore>,
    ) -> Self {
        Self {
            config,
            versions,
            projects,
            registry: Arc::new(RwLock::new(Registry::default())),
            stop_timeout: STOP_TIMEOUT,
        }
    }

    /// How long a stopping server may ignore SIGTERM before it is killed.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Launch `php -S` for a project and return its id without waiting for
    /// the server to accept connections.
    pub async fn start(&self, request: StartServerRequest) -> Result<ServerId, ServerError> {
        let plan = self.plan(request)?;
        let (php, lease) = self.versions.resolve_leased(&plan.php_version).await?;

        let port = self.reserve_port(&plan).await?;
        let id = ServerId::from(uuid::Uuid::new_v4().to_string());

        let mut child = match spawn_php(&php, &plan, port) {
            Ok(child) => child,
            Err(source) => {
                self.release_port(&plan.host, port).await;
                warn!(binary = %php.display(), error = %source, "failed to spawn PHP server");
                return Err(ServerError::Spawn {
                    binary: php,
                    source,
                });
            }
        };

        let logs = Arc::new(Mutex::new(LogBuffer::default()));
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_output(stdout, Arc::clone(&logs)));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_output(stderr, Arc::clone(&logs)));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = watch::channel(false);
        let handle = Arc::new(ServerHandle {
            id: id.clone(),
            pid: child.id(),
            host: plan.host.clone(),
            port,
            document_root: plan.document_root.clone(),
            project_path: plan.project_path.clone(),
            php_version: plan.php_version.clone(),
            started_at: Utc::now(),
            logs,
            control: tokio::sync::Mutex::new(Some(stop_tx)),
            done: done_rx,
        });

        // Insert before the supervisor starts so an instant exit still finds
        // an entry to evict.
        self.registry
            .write()
            .await
            .instances
            .insert(id.clone(), Arc::clone(&handle));

        tokio::spawn(supervise(
            child,
            handle,
            stop_rx,
            done_tx,
            Arc::clone(&self.registry),
            lease,
            self.stop_timeout,
        ));

        info!(
            server_id = %id,
            host = %plan.host,
            port,
            php_version = %plan.php_version,
            document_root = %plan.document_root.display(),
            "started PHP server"
        );
        Ok(id)
    }

    /// Terminate a server and wait until it has been evicted.
    pub async fn stop(&self, id: &ServerId) -> Result<(), ServerError> {
        let handle = self.handle(id).await?;
        request_stop(&handle).await;
        self.await_eviction(&handle).await;
        Ok(())
    }

    /// Stop every tracked server, reporting all failures together.
    pub async fn stop_all(&self) -> Result<usize, ServerError> {
        let handles: Vec<Arc<ServerHandle>> =
            self.registry.read().await.instances.values().cloned().collect();

        // Signal everything first so the grace periods overlap.
        for handle in &handles {
            request_stop(handle).await;
        }

        let mut failures = Vec::new();
        for handle in &handles {
            if !self.await_eviction(handle).await {
                failures.push(format!("{}: supervisor exited without reporting", handle.id));
            }
        }
        if failures.is_empty() {
            Ok(handles.len())
        } else {
            Err(ServerError::StopAll { failures })
        }
    }

    pub async fn status(&self, id: &ServerId) -> Result<ServerStatus, ServerError> {
        Ok(self.handle(id).await?.status())
    }

    /// Every tracked server, oldest first.
    pub async fn list(&self) -> Vec<(ServerId, ServerStatus)> {
        let mut servers: Vec<(ServerId, ServerStatus)> = self
            .registry
            .read()
            .await
            .instances
            .values()
            .map(|h| (h.id.clone(), h.status()))
            .collect();
        servers.sort_by(|a, b| a.1.started_at.cmp(&b.1.started_at).then_with(|| a.0.cmp(&b.0)));
        servers
    }

    /// Output captured since spawn, within the retention limit.
    pub async fn logs(&self, id: &ServerId) -> Result<String, ServerError> {
        let handle = self.handle(id).await?;
        let logs = handle.logs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(logs.snapshot())
    }

    /// First port at or above `start_port` that is neither tracked nor bound.
    pub async fn find_available_port(&self, start_port: u16) -> Result<u16, ServerError> {
        let host = self.config.get().server.default_host;
        let registry = self.registry.read().await;
        ports::scan(&host, start_port, |p| registry.port_taken(p))
    }

    pub async fn running_count(&self) -> usize {
        self.registry.read().await.instances.len()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn handle(&self, id: &ServerId) -> Result<Arc<ServerHandle>, ServerError> {
        self.registry
            .read()
            .await
            .instances
            .get(id)
            .cloned()
            .ok_or_else(|| ServerError::UnknownServer { id: id.clone() })
    }

    fn plan(&self, request: StartServerRequest) -> Result<LaunchPlan, ServerError> {
        if request.project_path.as_os_str().is_empty() {
            return Err(ServerError::InvalidInput("project path is empty".into()));
        }
        if !request.project_path.is_dir() {
            return Err(ServerError::ProjectNotFound {
                path: request.project_path,
            });
        }
        if request.port == Some(0) {
            return Err(ServerError::InvalidInput("port must be non-zero".into()));
        }

        let project = self.projects.get_info(&request.project_path)?;
        let config = self.config.get();

        let php_version = request
            .php_version
            .filter(|v| !v.trim().is_empty())
            .or_else(|| project.php_version.clone())
            .or_else(|| config.default_php_version.clone())
            .or_else(|| config.php_versions.first().cloned())
            .ok_or_else(|| ServerError::InvalidInput("no PHP version configured".into()))?;

        let host = request
            .host
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| config.server.default_host.clone());

        let document_root =
            resolve_document_root(&project, request.document_root.as_deref(), &config.server);
        if !document_root.is_dir() {
            return Err(ServerError::DocumentRootNotFound {
                path: document_root,
            });
        }

        let scan_from = match project.framework {
            Some(framework) if framework != Framework::Unknown => framework.default_port(),
            _ => config.server.default_port,
        };

        Ok(LaunchPlan {
            project_path: project.path,
            document_root,
            host,
            requested_port: request.port,
            scan_from,
            php_version,
            auto_reload: config.server.auto_reload,
        })
    }

    async fn reserve_port(&self, plan: &LaunchPlan) -> Result<u16, ServerError> {
        let mut registry = self.registry.write().await;
        let port = match plan.requested_port {
            Some(port) => {
                let key = (plan.host.clone(), port);
                if registry.reserved.contains(&key) || !ports::is_bindable(&plan.host, port) {
                    return Err(ServerError::PortInUse {
                        host: plan.host.clone(),
                        port,
                    });
                }
                port
            }
            None => ports::scan(&plan.host, plan.scan_from, |p| registry.port_taken(p))?,
        };
        registry.reserved.insert((plan.host.clone(), port));
        debug!(host = %plan.host, port, "reserved port");
        Ok(port)
    }

    async fn release_port(&self, host: &str, port: u16) {
        self.registry
            .write()
            .await
            .reserved
            .remove(&(host.to_string(), port));
    }

    /// Wait for the supervisor to evict `handle`. `false` if it vanished
    /// without signalling, in which case the entry is evicted here.
    async fn await_eviction(&self, handle: &ServerHandle) -> bool {
        let mut done = handle.done.clone();
        if done.wait_for(|d| *d).await.is_ok() {
            return true;
        }
        let mut registry = self.registry.write().await;
        registry.instances.remove(&handle.id);
        registry.reserved.remove(&(handle.host.clone(), handle.port));
        false
    }
}

/// Request override, then configured root, then the entry point's directory,
/// then the project itself. Relative paths are taken from the project path.
fn resolve_document_root(
    project: &ProjectInfo,
    requested: Option<&Path>,
    server: &ServerConfig,
) -> PathBuf {
    let under_project = |p: &Path| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            project.path.join(p)
        }
    };
    if let Some(root) = requested.filter(|p| !p.as_os_str().is_empty()) {
        return under_project(root);
    }
    if let Some(root) = &server.document_root {
        return under_project(root);
    }
    project
        .entry_point
        .as_deref()
        .and_then(|entry| Path::new(entry).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| project.path.join(dir))
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(|| project.path.clone())
}

fn spawn_php(php: &Path, plan: &LaunchPlan, port: u16) -> std::io::Result<Child> {
    let mut cmd = Command::new(php);
    if plan.auto_reload {
        cmd.args(["-d", "opcache.revalidate_freq=0"]);
    }
    cmd.arg("-S")
        .arg(ports::bind_addr(&plan.host, port))
        .arg("-t")
        .arg(&plan.document_root);
    let router = plan.document_root.join(ROUTER_SCRIPT);
    if router.is_file() {
        cmd.arg(router);
    }
    cmd.current_dir(&plan.project_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn()
}

async fn request_stop(handle: &ServerHandle) {
    if let Some(tx) = handle.control.lock().await.take() {
        let _ = tx.send(());
    }
}

/// Owns the child for its whole life. Exactly one per server.
async fn supervise(
    mut child: Child,
    handle: Arc<ServerHandle>,
    stop_rx: oneshot::Receiver<()>,
    done_tx: watch::Sender<bool>,
    registry: Arc<RwLock<Registry>>,
    lease: BinaryLease,
    stop_timeout: Duration,
) {
    let id = handle.id.clone();
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => warn!(server_id = %id, %status, "PHP server exited on its own"),
            Err(err) => warn!(server_id = %id, error = %err, "lost track of PHP server"),
        },
        _ = stop_rx => terminate(&mut child, handle.pid, &id, stop_timeout).await,
    }

    {
        let mut registry = registry.write().await;
        registry.instances.remove(&id);
        registry.reserved.remove(&(handle.host.clone(), handle.port));
    }
    drop(lease);
    let _ = done_tx.send(true);
    info!(server_id = %id, "evicted PHP server");
}

/// SIGTERM the process group, escalate to SIGKILL after `timeout`.
async fn terminate(child: &mut Child, pid: Option<u32>, id: &ServerId, timeout: Duration) {
    signal_group(child, pid, false);
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(_) => debug!(server_id = %id, "PHP server stopped gracefully"),
        Err(_) => {
            warn!(
                server_id = %id,
                timeout_ms = timeout.as_millis() as u64,
                "PHP server ignored SIGTERM; killing"
            );
            signal_group(child, pid, true);
            let _ = child.kill().await;
        }
    }
}

#[cfg(unix)]
fn signal_group(child: &mut Child, pid: Option<u32>, force: bool) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        let _ = child.start_kill();
        return;
    };
    // The server was spawned as its own group leader.
    if let Err(err) = kill(Pid::from_raw(-pid), signal) {
        debug!(pid, error = %err, "group signal failed; signalling leader");
        let _ = kill(Pid::from_raw(pid), signal);
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _pid: Option<u32>, _force: bool) {
    let _ = child.start_kill();
}

/// Copy lines from a child stream into its log buffer until EOF.
async fn drain_output<R>(reader: R, logs: Arc<Mutex<LogBuffer>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                logs.lock().unwrap_or_else(PoisonError::into_inner).push(line);
            }
        }
    }
}
