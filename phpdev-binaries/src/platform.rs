//! Platform naming for published PHP builds and the local cache layout.

use std::path::{Path, PathBuf};

use crate::error::BinaryError;

/// Asset published for the running platform, e.g. `php-linux-x64`.
pub fn asset_name() -> Result<String, BinaryError> {
    asset_name_for(std::env::consts::OS, std::env::consts::ARCH)
}

pub fn asset_name_for(os: &str, arch: &str) -> Result<String, BinaryError> {
    let os_name = match os {
        "linux" => "linux",
        "macos" => "mac",
        "windows" => "win",
        _ => {
            return Err(BinaryError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
        }
    };
    let arch_name = match arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    };
    let suffix = if os == "windows" { ".exe" } else { "" };
    Ok(format!("php-{os_name}-{arch_name}{suffix}"))
}

/// `{base}/{version}/{asset}` with any trailing slash on `base` collapsed.
pub fn download_url(base: &str, version: &str, asset: &str) -> String {
    format!("{}/{version}/{asset}", base.trim_end_matches('/'))
}

pub fn version_dir(cache_dir: &Path, version: &str) -> PathBuf {
    cache_dir.join(version)
}

/// `<cache>/<version>/bin/php`, or `<cache>/<version>/php.exe` on Windows.
pub fn executable_path(cache_dir: &Path, version: &str) -> PathBuf {
    if cfg!(windows) {
        version_dir(cache_dir, version).join("php.exe")
    } else {
        version_dir(cache_dir, version).join("bin").join("php")
    }
}

/// `true` iff `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
