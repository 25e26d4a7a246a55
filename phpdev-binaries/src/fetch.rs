//! HTTP download seam.
//!
//! Fetchers are blocking; the manager calls them from `spawn_blocking`.

use std::io::Read;
use std::time::Duration;

use thiserror::Error;

/// Upper bound on a single downloaded artifact.
pub const MAX_DOWNLOAD_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct FetchError(pub String);

pub trait Fetcher: Send + Sync {
    /// Body of `url`, or `Ok(None)` when the server answers 404.
    fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError>;
}

/// [`Fetcher`] backed by a `ureq` agent.
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(15))
            .timeout_read(Duration::from_secs(60))
            .user_agent(concat!("phpdev/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for UreqFetcher {
    fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(ureq::Error::Status(code, _)) => {
                return Err(FetchError(format!("HTTP {code}")));
            }
            Err(e) => return Err(FetchError(e.to_string())),
        };

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_DOWNLOAD_BYTES + 1)
            .read_to_end(&mut body)
            .map_err(|e| FetchError(format!("reading body: {e}")))?;
        if body.len() as u64 > MAX_DOWNLOAD_BYTES {
            return Err(FetchError(format!(
                "body exceeds {MAX_DOWNLOAD_BYTES} bytes"
            )));
        }
        Ok(Some(body))
    }
}
