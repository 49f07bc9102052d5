//! Change receiver: the deduplicating reconstruction engine.
//!
//! The incoming file is assembled in `<dest>.tmp` from segments that are
//! either already in the [`SegmentCache`](super::SegmentCache) or read off
//! the wire (and then cached). Only a complete stream replaces the
//! destination.

use crate::error::{Result, SyncError};
use crate::hash::Digest;
use crate::operation::FileType;
use crate::protocol::{DialogHeader, ServerDialog};
use crate::receive::paths::temp_path;
use crate::receive::{MirrorContext, ReceiveReport, ReceiverStrategy};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub struct ChangeReceiver {
    ctx: Arc<MirrorContext>,
}

impl ChangeReceiver {
    pub fn new(ctx: Arc<MirrorContext>) -> Self {
        Self { ctx }
    }

    /// Digest of the file currently at `dest`, if there is one.
    async fn existing_digest(&self, dest: &Path) -> Result<Option<Digest>> {
        match tokio::fs::metadata(dest).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::io_at("stat", dest)(e)),
        }

        let hash = self.ctx.hash;
        let path = dest.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || hash.digest_file(&path))
            .await?
            .map_err(SyncError::io_at("hash", dest))?;
        Ok(Some(digest))
    }

    async fn open_temp(&self, dest: &Path) -> Result<(std::path::PathBuf, File)> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(SyncError::io_at("create directory", parent))?;
        }

        let tmp = temp_path(dest);
        match tokio::fs::remove_file(&tmp).await {
            Ok(()) => debug!("Removed stale {}", tmp.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::io_at("remove stale temp file", &tmp)(e)),
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .await
            .map_err(SyncError::io_at("create temp file", &tmp))?;
        Ok((tmp, file))
    }

    /// Read one segment off the wire and check it against its announced
    /// digest before it can enter the cache.
    async fn receive_segment(&self, dialog: &mut ServerDialog, digest: &Digest) -> Result<Bytes> {
        let bytes = dialog.read(self.ctx.segment_size).await?;
        if self.ctx.hash.digest(&bytes) != *digest {
            return Err(SyncError::Protocol(format!(
                "Segment {} arrived with mismatched content ({} bytes)",
                digest,
                bytes.len()
            )));
        }
        self.ctx.cache.store(digest, bytes.clone()).await?;
        Ok(bytes)
    }
}

#[async_trait]
impl ReceiverStrategy for ChangeReceiver {
    async fn process(&self, header: &DialogHeader, dialog: &mut ServerDialog) -> Result<ReceiveReport> {
        let dest = self.ctx.resolve(&header.relative_path)?;

        if header.file_type == FileType::Directory {
            tokio::fs::create_dir_all(&dest)
                .await
                .map_err(SyncError::io_at("create directory", &dest))?;
            return Ok(ReceiveReport::default());
        }

        let digest_len = self.ctx.hash.digest_len();
        let file_digest = dialog.read(digest_len).await?;
        if !dialog.has_data() {
            debug!(
                "{}: stream ended before file digest ({} of {} bytes), nothing applied",
                header.relative_path,
                file_digest.len(),
                digest_len
            );
            return Ok(ReceiveReport::default());
        }
        let file_digest = Digest::from_bytes(file_digest.to_vec());

        if self.existing_digest(&dest).await?.as_ref() == Some(&file_digest) {
            dialog.notify(false).await?;
            debug!("{} unchanged", header.relative_path);
            return Ok(ReceiveReport {
                unchanged: true,
                ..Default::default()
            });
        }
        dialog.notify(true).await?;

        let (tmp, mut file) = self.open_temp(&dest).await?;
        self.ctx.cache.ensure_dir().await?;

        let mut report = ReceiveReport::default();
        loop {
            let raw = dialog.read(digest_len).await?;
            if !dialog.has_data() {
                if !raw.is_empty() {
                    warn!(
                        "{}: truncated segment digest, leaving {} in place",
                        header.relative_path,
                        tmp.display()
                    );
                    return Err(SyncError::Protocol(format!(
                        "Truncated segment digest: expected {} bytes, got {}",
                        digest_len,
                        raw.len()
                    )));
                }
                break;
            }
            let digest = Digest::from_bytes(raw.to_vec());

            let segment = if self.ctx.cache.contains(&digest).await? {
                dialog.notify(false).await?;
                report.segments_from_cache += 1;
                self.ctx.cache.load(&digest).await?
            } else {
                dialog.notify(true).await?;
                report.segments_from_network += 1;
                self.receive_segment(dialog, &digest).await?
            };

            file.write_all(&segment)
                .await
                .map_err(SyncError::io_at("write", &tmp))?;
        }

        file.flush().await.map_err(SyncError::io_at("flush", &tmp))?;
        file.sync_all().await.map_err(SyncError::io_at("sync", &tmp))?;
        drop(file);

        match tokio::fs::remove_file(&dest).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::io_at("remove", &dest)(e)),
        }
        tokio::fs::rename(&tmp, &dest)
            .await
            .map_err(SyncError::io_at("rename", &tmp))?;

        info!(
            "{}: {} segments from cache, {} from network",
            header.relative_path, report.segments_from_cache, report.segments_from_network
        );
        Ok(report)
    }
}
