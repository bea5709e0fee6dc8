//! Filesystem helpers for adapters and caches.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::fs;
use tracing::{debug, warn};

/// Sets a file's modification time to an epoch-milliseconds timestamp.
///
/// Negative timestamps clamp to the epoch.
pub async fn set_mtime(path: &Path, epoch_millis: i64) -> std::io::Result<()> {
    let millis = u64::try_from(epoch_millis).unwrap_or(0);
    let time = UNIX_EPOCH + Duration::from_millis(millis);
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let file = std::fs::OpenOptions::new().write(true).open(&path)?;
        file.set_times(std::fs::FileTimes::new().set_modified(time).set_accessed(time))
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Reads a file's modification time as epoch milliseconds.
pub async fn mtime_millis(path: &Path) -> std::io::Result<i64> {
    let modified = fs::metadata(path).await?.modified()?;
    let millis = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    Ok(i64::try_from(millis).unwrap_or(i64::MAX))
}

/// Removes a file, treating absence as success.
///
/// Returns whether a file was removed.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Unique sibling path used to stage a write before renaming it into place.
#[must_use]
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.part", uuid::Uuid::new_v4().simple()))
}

/// Moves a file, falling back to copy-and-remove across filesystems.
///
/// Permission errors are ignored when the destination exists afterwards:
/// filesystems that cannot carry permissions over report `EPERM` even though
/// the data arrived.
pub async fn move_safe(source: &Path, destination: &Path) -> std::io::Result<()> {
    let result = match fs::rename(source, destination).await {
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(?source, ?destination, "rename crosses devices, copying instead");
            match fs::copy(source, destination).await {
                Ok(_) => fs::remove_file(source).await,
                Err(e) => Err(e),
            }
        }
        other => other,
    };
    tolerate_permission_denied(result, source, destination).await
}

/// Copies a file with the same permission-error tolerance as [`move_safe`].
pub async fn copy_safe(source: &Path, destination: &Path) -> std::io::Result<()> {
    let result = fs::copy(source, destination).await.map(|_| ());
    tolerate_permission_denied(result, source, destination).await
}

async fn tolerate_permission_denied(
    result: std::io::Result<()>,
    source: &Path,
    destination: &Path,
) -> std::io::Result<()> {
    match result {
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            if fs::try_exists(destination).await.unwrap_or(false) {
                warn!(?source, ?destination, error = %e, "ignoring permission error, destination present");
                Ok(())
            } else {
                Err(e)
            }
        }
        other => other,
    }
}

/// Creates a directory (and parents) and verifies it is a writable directory.
pub async fn ensure_writable_dir(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| format!("cannot create {}: {e}", dir.display()))?;

    let meta = fs::metadata(dir)
        .await
        .map_err(|e| format!("cannot stat {}: {e}", dir.display()))?;
    if !meta.is_dir() {
        return Err(format!("{} is not a directory", dir.display()));
    }

    let probe = dir.join(format!(".write-probe-{}", uuid::Uuid::new_v4().simple()));
    fs::write(&probe, b"")
        .await
        .map_err(|e| format!("{} is not writable: {e}", dir.display()))?;
    let _ = fs::remove_file(&probe).await;

    Ok(())
}
