//! phpdev daemon: PHP server orchestration behind a Unix socket.

mod error;
pub mod log_buffer;
pub mod orchestrator;
pub mod ports;
pub mod protocol;
mod runtime;
mod service;

pub use error::{DaemonError, ServerError};
pub use orchestrator::ServerManager;
pub use protocol::{
    request, request_shutdown, request_status, send_request, DaemonRequest, DaemonResponse,
    DaemonStatus, RunningServer,
};
pub use runtime::{dispatch, run, start_blocking, LogFormat};
pub use service::{Collaborators, PhpEnv};
