//! The binary version manager.
//!
//! Cache layout is `<cache>/<version>/bin/php`. A version counts as installed
//! iff that file exists and is executable; the file only appears there via
//! `rename` after the staged `php.part` validated, so a crash mid-download
//! can leave a stale `.part` but never a half-written `php`.
//!
//! Locks:
//! - `flights`: one async mutex per version. Install, leased resolve and
//!   remove all serialize on it, so a second resolver waits for the first
//!   download and then takes the cache-hit path.
//! - `leases`: running servers per version, checked by `remove`.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use phpdev_core::{parse_version, ConfigStore, PhpBinary};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::checksum::{parse_checksum_file, sha256_hex};
use crate::error::{io_err, BinaryError};
use crate::fetch::Fetcher;
use crate::platform;

/// Bound on any `php --version` invocation.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

type LeaseTable = Arc<Mutex<HashMap<String, usize>>>;

pub struct VersionManager {
    cache_dir: PathBuf,
    config: Arc<ConfigStore>,
    fetcher: Arc<dyn Fetcher>,
    flights: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    leases: LeaseTable,
}

/// Marks a version as backing a running server until dropped.
#[derive(Debug)]
pub struct BinaryLease {
    version: String,
    table: LeaseTable,
}

impl BinaryLease {
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Drop for BinaryLease {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = table.get_mut(&self.version) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                table.remove(&self.version);
            }
        }
    }
}

impl VersionManager {
    pub fn new(cache_dir: PathBuf, config: Arc<ConfigStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            cache_dir,
            config,
            fetcher,
            flights: Mutex::new(HashMap::new()),
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn executable_path(&self, version: &str) -> PathBuf {
        platform::executable_path(&self.cache_dir, version)
    }

    /// Local executable for `version`, downloading and validating on a miss.
    pub async fn resolve(&self, version: &str) -> Result<PathBuf, BinaryError> {
        check_version(version)?;
        let exe = self.executable_path(version);
        if platform::is_executable(&exe) {
            debug!(version, "PHP binary cache hit");
            return Ok(exe);
        }
        let flight = self.flight(version);
        let _guard = flight.lock().await;
        self.resolve_locked(version).await
    }

    /// Like [`resolve`](Self::resolve) but also returns a lease that blocks
    /// [`remove`](Self::remove) until it is dropped.
    pub async fn resolve_leased(
        &self,
        version: &str,
    ) -> Result<(PathBuf, BinaryLease), BinaryError> {
        check_version(version)?;
        let lease = self.lease(version);
        let flight = self.flight(version);
        let _guard = flight.lock().await;
        let exe = self.resolve_locked(version).await?;
        Ok((exe, lease))
    }

    /// Number of live leases on `version`.
    pub fn leases(&self, version: &str) -> usize {
        self.leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(version)
            .copied()
            .unwrap_or(0)
    }

    /// Configured versions plus any cached ones, newest first.
    pub async fn list(&self) -> Result<Vec<PhpBinary>, BinaryError> {
        let cache_dir = self.cache_dir.clone();
        let config = self.config.get();
        let binaries = tokio::task::spawn_blocking(move || {
            let mut versions: BTreeSet<String> = config.php_versions.into_iter().collect();
            versions.extend(cached_versions(&cache_dir)?);

            let asset = platform::asset_name().ok();
            let mut binaries: Vec<PhpBinary> = versions
                .into_iter()
                .map(|version| {
                    let exe = platform::executable_path(&cache_dir, &version);
                    let downloaded = platform::is_executable(&exe);
                    let size = downloaded
                        .then(|| std::fs::metadata(&exe).ok().map(|m| m.len()))
                        .flatten();
                    PhpBinary {
                        download_url: asset.as_deref().map(|a| {
                            platform::download_url(&config.download_base_url, &version, a)
                        }),
                        path: downloaded.then_some(exe),
                        downloaded,
                        size,
                        version,
                    }
                })
                .collect();
            binaries.sort_by(|a, b| parse_version(&b.version).cmp(&parse_version(&a.version)));
            Ok::<_, BinaryError>(binaries)
        })
        .await??;
        Ok(binaries)
    }

    /// First line of `php --version` for an installed `version`.
    pub async fn get_version_string(&self, version: &str) -> Result<String, BinaryError> {
        check_version(version)?;
        let exe = self.executable_path(version);
        if !platform::is_executable(&exe) {
            return Err(BinaryError::NotInstalled {
                version: version.to_string(),
            });
        }
        query_version(&exe, version).await
    }

    /// Delete the cached binary and drop `version` from the configured list.
    ///
    /// Fails with [`BinaryError::InUse`] while a server holds a lease.
    pub async fn remove(&self, version: &str) -> Result<(), BinaryError> {
        check_version(version)?;
        let flight = self.flight(version);
        let _guard = flight.lock().await;

        let servers = self.leases(version);
        if servers > 0 {
            return Err(BinaryError::InUse {
                version: version.to_string(),
                servers,
            });
        }

        let dir = platform::version_dir(&self.cache_dir, version);
        let cached = dir.exists();
        let mut config = self.config.get();
        let configured = config.php_versions.iter().any(|v| v == version);
        if !cached && !configured {
            return Err(BinaryError::UnknownVersion {
                version: version.to_string(),
            });
        }

        if cached {
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| io_err(&dir, e))?;
        }
        if configured {
            config.php_versions.retain(|v| v != version);
            let store = Arc::clone(&self.config);
            tokio::task::spawn_blocking(move || store.set(config)).await??;
        }
        info!(version, cached, configured, "removed PHP version");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn flight(&self, version: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(flights.entry(version.to_string()).or_default())
    }

    fn lease(&self, version: &str) -> BinaryLease {
        let mut table = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        *table.entry(version.to_string()).or_insert(0) += 1;
        BinaryLease {
            version: version.to_string(),
            table: Arc::clone(&self.leases),
        }
    }

    /// Caller holds the flight lock for `version`.
    async fn resolve_locked(&self, version: &str) -> Result<PathBuf, BinaryError> {
        let exe = self.executable_path(version);
        if platform::is_executable(&exe) {
            return Ok(exe);
        }

        let dir = platform::version_dir(&self.cache_dir, version);
        let fresh_dir = !dir.exists();
        let part = staging_path(&exe);
        match self.install(version, &part, &exe).await {
            Ok(()) => Ok(exe),
            Err(err) => {
                warn!(version, error = %err, "PHP install failed; removing partial download");
                let _ = tokio::fs::remove_file(&part).await;
                if fresh_dir {
                    let _ = tokio::fs::remove_dir_all(&dir).await;
                }
                Err(err)
            }
        }
    }

    async fn install(&self, version: &str, part: &Path, exe: &Path) -> Result<(), BinaryError> {
        let asset = platform::asset_name()?;
        let base = self.config.get().download_base_url;
        let url = platform::download_url(&base, version, &asset);

        info!(version, url = %url, "downloading PHP");
        let bytes = self.fetch(&url).await?.ok_or_else(|| BinaryError::Download {
            url: url.clone(),
            message: "not found (HTTP 404)".into(),
        })?;

        let checksum_url = format!("{url}.sha256");
        if let Some(body) = self.fetch(&checksum_url).await? {
            let expected = parse_checksum_file(&String::from_utf8_lossy(&body)).ok_or_else(|| {
                BinaryError::Download {
                    url: checksum_url.clone(),
                    message: "malformed checksum file".into(),
                }
            })?;
            let actual = sha256_hex(&bytes);
            if expected != actual {
                return Err(BinaryError::ChecksumMismatch {
                    url,
                    expected,
                    actual,
                });
            }
            debug!(version, "checksum verified");
        }

        if let Some(bin_dir) = part.parent() {
            tokio::fs::create_dir_all(bin_dir)
                .await
                .map_err(|e| io_err(bin_dir, e))?;
        }
        tokio::fs::write(part, &bytes)
            .await
            .map_err(|e| io_err(part, e))?;
        set_executable(part).await?;

        let reported = query_version(part, version)
            .await
            .map_err(|e| BinaryError::Validation {
                version: version.to_string(),
                message: e.to_string(),
            })?;
        if !reports_version(&reported, version) {
            return Err(BinaryError::Validation {
                version: version.to_string(),
                message: format!("binary reports '{reported}'"),
            });
        }

        tokio::fs::rename(part, exe)
            .await
            .map_err(|e| io_err(exe, e))?;
        info!(version, reported = %reported, size = bytes.len(), "installed PHP binary");
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>, BinaryError> {
        let fetcher = Arc::clone(&self.fetcher);
        let owned = url.to_string();
        tokio::task::spawn_blocking(move || fetcher.fetch(&owned))
            .await?
            .map_err(|e| BinaryError::Download {
                url: url.to_string(),
                message: e.0,
            })
    }
}

fn check_version(version: &str) -> Result<(), BinaryError> {
    parse_version(version)
        .map(|_| ())
        .ok_or_else(|| BinaryError::InvalidVersion(version.to_string()))
}

/// Whether a `--version` banner names the MAJOR.MINOR of `version`.
fn reports_version(banner: &str, version: &str) -> bool {
    match parse_version(version) {
        Some([major, minor, _]) => banner.starts_with(&format!("PHP {major}.{minor}.")),
        None => false,
    }
}

fn staging_path(exe: &Path) -> PathBuf {
    let name = exe
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "php".to_string());
    exe.with_file_name(format!("{name}.part"))
}

fn cached_versions(cache_dir: &Path) -> Result<Vec<String>, BinaryError> {
    let entries = match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(cache_dir, e)),
    };
    Ok(entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| parse_version(name).is_some())
        .collect())
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<(), BinaryError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<(), BinaryError> {
    Ok(())
}

/// Run `<path> --version` under [`VALIDATION_TIMEOUT`]; first stdout line.
async fn query_version(path: &Path, version: &str) -> Result<String, BinaryError> {
    let output = tokio::time::timeout(VALIDATION_TIMEOUT, run_version_flag(path))
        .await
        .map_err(|_| BinaryError::Timeout {
            version: version.to_string(),
            secs: VALIDATION_TIMEOUT.as_secs(),
        })?
        .map_err(|source| BinaryError::Exec {
            path: path.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(BinaryError::Validation {
            version: version.to_string(),
            message: format!("--version exited with {}", output.status),
        });
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BinaryError::Validation {
            version: version.to_string(),
            message: "--version printed nothing".into(),
        })
}

async fn run_version_flag(path: &Path) -> std::io::Result<Output> {
    let mut attempts = 0;
    loop {
        let result = Command::new(path)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;
        match result {
            // A just-written file can still be open for writing in a child
            // forked concurrently elsewhere in this process.
            Err(e) if is_text_busy(&e) && attempts < 5 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            other => return other,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(nix::errno::Errno::ETXTBSY as i32)
}
#[cfg(not(unix))]
fn is_text_busy(_err: &std::io::Error) -> bool {
    false
}
