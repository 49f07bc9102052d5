//! Content-addressed segment cache, shared by every file and every
//! connection under one mirror root.
//!
//! Layout: `<mirror root>/.syncer/<hex digest>`, one flat file per distinct
//! segment. Entries are never evicted or overwritten.

use crate::error::{Result, SyncError};
use crate::hash::Digest;
use bytes::Bytes;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Reserved directory under the mirror root.
pub const CACHE_DIR_NAME: &str = ".syncer";

#[derive(Debug, Clone)]
pub struct SegmentCache {
    dir: PathBuf,
}

impl SegmentCache {
    pub fn new(mirror_root: &Path) -> Self {
        Self {
            dir: mirror_root.join(CACHE_DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, digest: &Digest) -> PathBuf {
        self.dir.join(digest.to_hex())
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(SyncError::io_at("create cache directory", &self.dir))
    }

    pub async fn contains(&self, digest: &Digest) -> Result<bool> {
        let path = self.path_for(digest);
        tokio::fs::try_exists(&path)
            .await
            .map_err(SyncError::io_at("check cached segment", &path))
    }

    pub async fn load(&self, digest: &Digest) -> Result<Bytes> {
        let path = self.path_for(digest);
        let data = tokio::fs::read(&path)
            .await
            .map_err(SyncError::io_at("read cached segment", &path))?;
        Ok(Bytes::from(data))
    }

    /// Publish a segment under its digest. The bytes land in a temp file in
    /// the cache directory first and are linked into place only when
    /// complete. Returns false if the entry already existed.
    pub async fn store(&self, digest: &Digest, data: Bytes) -> Result<bool> {
        let dir = self.dir.clone();
        let path = self.path_for(digest);
        tokio::task::spawn_blocking(move || -> io::Result<bool> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&data)?;
            tmp.flush()?;
            match tmp.persist_noclobber(&path) {
                Ok(_) => Ok(true),
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e.error),
            }
        })
        .await?
        .map_err(SyncError::io_at("store cached segment", self.path_for(digest)))
    }
}
