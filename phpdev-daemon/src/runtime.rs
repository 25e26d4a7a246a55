use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use phpdev_core::paths::socket_path;
use phpdev_core::ErrorKind;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use crate::error::{io_err, DaemonError};
use crate::protocol::{DaemonRequest, DaemonResponse, DaemonStatus, RunningServer};
use crate::service::PhpEnv;

/// Log output format for [`start_blocking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, format: LogFormat) -> Result<(), DaemonError> {
    init_tracing(format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let env = Arc::new(PhpEnv::open(home)?);
    runtime.block_on(run(env))
}

/// Serve `env` on its socket until ctrl-c or a `shutdown` request, then
/// stop every server it started.
pub async fn run(env: Arc<PhpEnv>) -> Result<(), DaemonError> {
    let socket = socket_path(env.home());
    prepare_socket_for_bind(&socket)?;
    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    let started = Instant::now();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let env = Arc::clone(&env);
        let socket = socket.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                listener,
                socket,
                env,
                shutdown.clone(),
                shutdown.subscribe(),
                started,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("ctrl-c received; stopping servers");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(io_err("ctrl-c handler", err)),
                    }
                }
            }
        })
    };

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);

    match env.stop_all_servers().await {
        Ok(0) => {}
        Ok(stopped) => tracing::info!(stopped, "stopped PHP servers on shutdown"),
        Err(err) => tracing::error!(error = %err, "some PHP servers failed to stop"),
    }

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    listener: UnixListener,
    socket: PathBuf,
    env: Arc<PhpEnv>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started: Instant,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let env = Arc::clone(&env);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, env, shutdown_tx, started).await {
                        tracing::error!(error = %err, "client connection failed");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    env: Arc<PhpEnv>,
    shutdown_tx: broadcast::Sender<()>,
    started: Instant,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("reading request", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(
                        ErrorKind::InvalidInput,
                        format!("invalid request JSON: {err}"),
                    ),
                )
                .await?;
                continue;
            }
        };

        let shutdown = request == DaemonRequest::Shutdown;
        let response = match request {
            DaemonRequest::Status => respond(Ok::<_, DaemonError>(DaemonStatus {
                pid: std::process::id(),
                uptime_secs: started.elapsed().as_secs(),
                servers: env.running_server_count().await,
                socket: socket_path(env.home()),
            })),
            DaemonRequest::Shutdown => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => dispatch(&env, other).await,
        };

        write_response(&mut writer, &response).await?;
        if shutdown {
            break;
        }
    }

    Ok(())
}

/// Route one environment operation.
pub async fn dispatch(env: &PhpEnv, request: DaemonRequest) -> DaemonResponse {
    use DaemonRequest as R;

    match request {
        R::GetConfig => respond(Ok::<_, DaemonError>(env.get_config())),
        R::SetConfig { config } => respond(env.set_config(config).await.map(|()| Value::Null)),

        R::ListPhpBinaries => respond(env.list_php_binaries().await),
        R::DownloadPhpBinary { version } => respond(env.download_php_binary(&version).await),
        R::GetPhpVersion { version } => respond(env.get_php_version(&version).await),
        R::RemovePhpBinary { version } => {
            respond(env.remove_php_binary(&version).await.map(|()| Value::Null))
        }

        R::CloneProject { request } => respond(env.clone_project(request).await),
        R::AddProject { path, name } => respond(env.add_project(&path, name.as_deref()).await),
        R::ListProjects => respond(Ok::<_, DaemonError>(env.list_projects())),
        R::RemoveProject { name } => respond(env.remove_project(&name).await),
        R::GetProjectInfo { path } => respond(env.get_project_info(&path).await),
        R::DetectFramework { path } => respond(env.detect_framework(&path)),
        R::GetFrameworkInfo { framework } => {
            respond(Ok::<_, DaemonError>(env.get_framework_info(framework)))
        }
        R::ValidateProjectPath { path } => {
            respond(Ok::<_, DaemonError>(env.validate_project_path(&path)))
        }

        R::StartServer { request } => respond(env.start_server(request).await),
        R::StopServer { server_id } => {
            respond(env.stop_server(&server_id).await.map(|()| Value::Null))
        }
        R::StopAllServers => respond(
            env.stop_all_servers()
                .await
                .map(|stopped| json!({ "stopped": stopped })),
        ),
        R::GetServerStatus { server_id } => respond(env.get_server_status(&server_id).await),
        R::ListRunningServers => {
            let servers: Vec<RunningServer> = env
                .list_running_servers()
                .await
                .into_iter()
                .map(|(id, status)| RunningServer { id, status })
                .collect();
            respond(Ok::<_, DaemonError>(servers))
        }
        R::GetServerLogs { server_id } => respond(env.get_server_logs(&server_id).await),
        R::FindAvailablePort { start_port } => {
            respond(env.find_available_port(start_port).await)
        }

        R::Status | R::Shutdown => DaemonResponse::error(
            ErrorKind::InvalidInput,
            "daemon control command cannot be dispatched to the environment",
        ),
    }
}

/// Errors that know their [`ErrorKind`].
pub trait Classified: std::fmt::Display {
    fn kind(&self) -> ErrorKind;
}

macro_rules! classified {
    ($($ty:ty),* $(,)?) => {
        $(impl Classified for $ty {
            fn kind(&self) -> ErrorKind {
                <$ty>::kind(self)
            }
        })*
    };
}

classified!(
    DaemonError,
    crate::error::ServerError,
    phpdev_core::StoreError,
    phpdev_binaries::BinaryError,
    phpdev_projects::ImportError,
    phpdev_detector::DetectError,
);

fn respond<T: Serialize, E: Classified>(result: Result<T, E>) -> DaemonResponse {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(data) => DaemonResponse::ok(data),
            Err(err) => DaemonResponse::error(ErrorKind::Io, format!("encoding response: {err}")),
        },
        Err(err) => DaemonResponse::error(err.kind(), err.to_string()),
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if let Some(dir) = socket.parent() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::AlreadyRunning {
                socket: socket.to_path_buf(),
            });
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "socket file is stale; removing it",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == IoErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut frame = serde_json::to_vec(response)?;
    frame.push(b'\n');
    writer
        .write_all(&frame)
        .await
        .map_err(|e| io_err("writing response", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("flushing response", e))
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task did not finish: {err}"
        ))),
    }
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stale_socket_is_removed() {
        let home = TempDir::new().unwrap();
        let socket = socket_path(home.path());
        fs::create_dir_all(socket.parent().unwrap()).unwrap();
        fs::write(&socket, "").unwrap();
        prepare_socket_for_bind(&socket).unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn dispatch_reports_error_kinds() {
        let home = TempDir::new().unwrap();
        let env = PhpEnv::open(home.path()).unwrap();

        let response = dispatch(
            &env,
            DaemonRequest::StopServer {
                server_id: "missing".into(),
            },
        )
        .await;
        assert!(!response.ok);
        assert_eq!(response.kind, Some(ErrorKind::NotFound));

        let response = dispatch(
            &env,
            DaemonRequest::RemoveProject {
                name: "ghost".to_string(),
            },
        )
        .await;
        assert_eq!(response.kind, Some(ErrorKind::NotFound));

        let response = dispatch(
            &env,
            DaemonRequest::ValidateProjectPath {
                path: home.path().to_path_buf(),
            },
        )
        .await;
        assert_eq!(response.data, Some(json!(true)));
    }

    #[tokio::test]
    async fn dispatch_adds_and_inspects_projects() {
        let home = TempDir::new().unwrap();
        let env = PhpEnv::open(home.path()).unwrap();
        let site = home.path().join("shop");
        fs::create_dir_all(site.join("public")).unwrap();
        fs::write(site.join("artisan"), "").unwrap();
        fs::write(site.join("composer.json"), "{ broken").unwrap();
        fs::write(site.join("public/index.php"), "<?php").unwrap();

        let response = dispatch(&env, DaemonRequest::GetProjectInfo { path: site.clone() }).await;
        assert!(response.ok, "{:?}", response.error);
        assert_eq!(response.data.unwrap()["framework"], "Laravel");
        assert!(env.list_projects().is_empty());

        let response = dispatch(
            &env,
            DaemonRequest::AddProject {
                path: site.clone(),
                name: None,
            },
        )
        .await;
        assert!(response.ok, "{:?}", response.error);
        assert_eq!(response.data.unwrap()["name"], "shop");
        assert_eq!(env.list_projects().len(), 1);

        let response = dispatch(
            &env,
            DaemonRequest::AddProject {
                path: home.path().join("absent"),
                name: Some("absent".to_string()),
            },
        )
        .await;
        assert_eq!(response.kind, Some(ErrorKind::NotFound));
    }
}
