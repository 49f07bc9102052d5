//! Waiting out writers that still hold a source file open exclusively.

use crate::error::{Result, SyncError};
use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;

/// Whether another process holds `path` exclusively. Blocking.
///
/// A file that cannot be found is reported as unlocked so the caller moves on
/// and fails (or not) on the real open.
pub fn is_locked(path: &Path) -> io::Result<bool> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        #[cfg(windows)]
        Err(e) if e.raw_os_error() == Some(ERROR_SHARING_VIOLATION) => return Ok(true),
        Err(e) => return Err(e),
    };

    match file.try_lock_exclusive() {
        Ok(()) => {
            file.unlock()?;
            Ok(false)
        }
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(true),
        Err(e) => Err(e),
    }
}

/// Poll `path` every `interval` until it is free. With `limit` set, give up
/// with [`SyncError::FileLocked`] after that many locked probes; without it,
/// wait indefinitely. Returns the number of locked probes seen.
pub async fn wait_until_unlocked(path: &Path, interval: Duration, limit: Option<u32>) -> Result<u32> {
    let mut attempts = 0u32;
    loop {
        let probe = path.to_path_buf();
        let locked = tokio::task::spawn_blocking(move || is_locked(&probe))
            .await?
            .map_err(SyncError::io_at("probe lock on", path))?;
        if !locked {
            return Ok(attempts);
        }

        attempts += 1;
        if limit.is_some_and(|max| attempts >= max) {
            return Err(SyncError::FileLocked {
                path: path.to_path_buf(),
                attempts,
            });
        }
        debug!(
            "{} is locked (attempt {}), retrying in {:?}",
            path.display(),
            attempts,
            interval
        );
        tokio::time::sleep(interval).await;
    }
}
