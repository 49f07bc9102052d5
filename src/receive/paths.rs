//! Mapping wire paths onto the mirror root.

use crate::error::{Result, SyncError};
use crate::receive::cache::CACHE_DIR_NAME;
use std::path::{Component, Path, PathBuf};

/// Resolve a relative path received from the peer to a location under
/// `root`, rejecting anything that could escape it or touch the cache.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf> {
    let invalid = |reason| SyncError::InvalidPath {
        path: relative.to_string(),
        reason,
    };

    if relative.is_empty() {
        return Err(invalid("empty path"));
    }

    let rel_path = Path::new(relative);
    if rel_path.is_absolute() || relative.starts_with('/') || relative.starts_with('\\') {
        return Err(invalid("absolute path"));
    }

    for (i, component) in rel_path.components().enumerate() {
        match component {
            Component::ParentDir => return Err(invalid("path traversal")),
            Component::Prefix(_) | Component::RootDir => return Err(invalid("absolute path")),
            Component::Normal(name) if i == 0 && name == CACHE_DIR_NAME => {
                return Err(invalid("reserved cache directory"))
            }
            _ => {}
        }
    }

    let full = root.join(rel_path);
    if !normalize_path(&full).starts_with(normalize_path(root)) {
        return Err(invalid("escapes mirror root"));
    }
    Ok(full)
}

/// `<path>.tmp`, the staging file a received file is written to before it
/// replaces the destination.
pub fn temp_path(dest: &Path) -> PathBuf {
    let mut os = dest.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Normalize a path without requiring it to exist (unlike canonicalize)
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            c => normalized.push(c),
        }
    }
    normalized
}
