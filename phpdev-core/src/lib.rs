//! phpdev core library: domain types, persisted state, error kinds.
//!
//! - [`types`]: newtypes, the [`Framework`] table, wire structs
//! - [`error`]: [`ErrorKind`] and [`StoreError`]
//! - [`config`]: the process-wide [`ConfigStore`]
//! - [`registry`]: atomic YAML persistence for the project registry
//! - [`paths`]: on-disk layout under `~/.phpdev/`

pub mod config;
pub mod error;
pub mod paths;
pub mod registry;
pub mod types;

pub use config::ConfigStore;
pub use error::{ErrorKind, StoreError};
pub use types::{
    parse_version, CloneProjectRequest, Config, Framework, FrameworkInfo, PhpBinary, ProjectInfo,
    ProjectName, ServerConfig, ServerId, ServerStatus, StartServerRequest,
};
