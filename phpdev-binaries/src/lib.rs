//! phpdev-binaries: versioned PHP runtime cache.
//!
//! [`VersionManager`] resolves `MAJOR.MINOR.PATCH` to a local executable,
//! downloading through a [`Fetcher`] on a cache miss. Downloads are
//! single-flight per version and never leave a partial binary behind.

pub mod checksum;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod platform;

pub use error::BinaryError;
pub use fetch::{FetchError, Fetcher, UreqFetcher};
pub use manager::{BinaryLease, VersionManager};
