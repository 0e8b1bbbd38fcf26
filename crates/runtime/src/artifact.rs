//! Tool-server artifact checks.
//!
//! "Absent" and "present but not executable" are distinct conditions. The
//! latter heals itself on POSIX targets by setting the execute bits.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::ConnectError;

/// What an inspection found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub path: PathBuf,
    pub exists: bool,
    pub executable: bool,
    /// The execute bits were missing and have been set.
    pub permissions_fixed: bool,
    pub size: Option<u64>,
    pub error: Option<String>,
}

/// Inspect the artifact, healing missing execute permission.
///
/// Never fails; problems land in [`ArtifactReport::error`].
pub fn inspect(path: &Path) -> ArtifactReport {
    let mut report = ArtifactReport {
        path: path.to_path_buf(),
        exists: false,
        executable: false,
        permissions_fixed: false,
        size: None,
        error: None,
    };

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };

    report.exists = true;
    report.size = Some(metadata.len());

    match make_executable(path, &metadata) {
        Ok(fixed) => {
            report.executable = true;
            report.permissions_fixed = fixed;
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    report
}

/// Check the artifact before launching it.
pub fn ensure_executable(path: &Path) -> Result<(), ConnectError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConnectError::ArtifactNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ConnectError::ArtifactNotExecutable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    make_executable(path, &metadata)
        .map(|_| ())
        .map_err(|e| ConnectError::ArtifactNotExecutable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Returns whether permissions had to be changed.
#[cfg(unix)]
fn make_executable(path: &Path, metadata: &std::fs::Metadata) -> io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    if !metadata.is_file() {
        return Err(io::Error::other("not a regular file"));
    }

    let mut permissions = metadata.permissions();
    let mode = permissions.mode();
    if mode & 0o111 != 0 {
        return Ok(false);
    }

    permissions.set_mode(mode | 0o111);
    std::fs::set_permissions(path, permissions).inspect_err(|e| {
        warn!(path = %path.display(), error = %e, "could not make artifact executable");
    })?;
    info!(path = %path.display(), "added execute permission to artifact");
    Ok(true)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path, metadata: &std::fs::Metadata) -> io::Result<bool> {
    if metadata.is_file() {
        Ok(false)
    } else {
        Err(io::Error::other("not a regular file"))
    }
}
