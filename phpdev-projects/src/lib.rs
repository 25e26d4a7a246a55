//! phpdev-projects: project registry and Git import.
//!
//! - [`store`]: name → project map mirrored to `projects.yaml`
//! - [`importer`]: clone, detect, optional setup, register
//! - [`git`] / [`setup`]: external collaborators behind traits

pub mod error;
pub mod git;
pub mod importer;
pub mod setup;
pub mod store;

pub use error::ImportError;
pub use git::{GitCli, GitCloner};
pub use importer::{project_name_from_url, CloneOutcome, Importer, SetupFailure};
pub use setup::{SetupRunner, ShellRunner};
pub use store::{inspect_project, ProjectStore};
