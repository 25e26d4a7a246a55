use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use phpdev_core::paths::socket_path;
use phpdev_core::{
    CloneProjectRequest, Config, ErrorKind, Framework, ServerId, ServerStatus,
    StartServerRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};

/// JSON newline-delimited request, tagged by `cmd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    Status,
    Shutdown,

    GetConfig,
    SetConfig { config: Config },

    ListPhpBinaries,
    DownloadPhpBinary { version: String },
    GetPhpVersion { version: String },
    RemovePhpBinary { version: String },

    CloneProject { request: CloneProjectRequest },
    AddProject {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    ListProjects,
    RemoveProject { name: String },
    GetProjectInfo { path: PathBuf },
    DetectFramework { path: PathBuf },
    GetFrameworkInfo { framework: Framework },
    ValidateProjectPath { path: PathBuf },

    StartServer { request: StartServerRequest },
    StopServer { server_id: ServerId },
    StopAllServers,
    GetServerStatus { server_id: ServerId },
    ListRunningServers,
    GetServerLogs { server_id: ServerId },
    FindAvailablePort { start_port: u16 },
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            kind: Some(kind),
        }
    }

    /// Unwrap into the payload, or a [`DaemonError::Remote`] carrying the kind.
    pub fn into_result(self) -> Result<Value, DaemonError> {
        if self.ok {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        Err(DaemonError::Remote {
            kind: self.kind.unwrap_or(ErrorKind::Io),
            message: self
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        })
    }
}

/// One entry of `list_running_servers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningServer {
    pub id: ServerId,
    #[serde(flatten)]
    pub status: ServerStatus,
}

/// Payload of the `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub pid: u32,
    pub uptime_secs: u64,
    pub servers: usize,
    pub socket: PathBuf,
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// Send `request` and unwrap the payload.
pub fn request(home: &Path, request: &DaemonRequest) -> Result<Value, DaemonError> {
    send_request(home, request)?.into_result()
}

/// `status`, retrying briefly while a freshly started daemon binds its socket.
pub fn request_status(home: &Path) -> Result<DaemonStatus, DaemonError> {
    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match request(home, &DaemonRequest::Status) {
            Ok(value) => return Ok(serde_json::from_value(value)?),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_shutdown(home: &Path) -> Result<(), DaemonError> {
    request(home, &DaemonRequest::Shutdown).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_are_tagged_by_cmd() {
        let req = DaemonRequest::StopServer {
            server_id: ServerId::from("abc"),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"cmd": "stop_server", "server_id": "abc"})
        );
        let parsed: DaemonRequest =
            serde_json::from_str(r#"{"cmd":"find_available_port","start_port":8000}"#).unwrap();
        assert_eq!(parsed, DaemonRequest::FindAvailablePort { start_port: 8000 });
    }

    #[test]
    fn error_response_keeps_kind() {
        let err = DaemonResponse::error(ErrorKind::NotFound, "no running server with id x")
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "no running server with id x");
    }

    #[test]
    fn missing_socket_is_not_running() {
        let home = tempfile::TempDir::new().unwrap();
        let err = send_request(home.path(), &DaemonRequest::Status).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }
}
