use crate::error::{Result, SyncError};
use crate::protocol::{DialogHeader, ServerDialog};
use crate::receive::{MirrorContext, ReceiveReport, ReceiverStrategy};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Moves a path within the mirror. A directory replaces whatever directory
/// sits at the destination; a file never overwrites an existing entry.
pub struct RenameReceiver {
    ctx: Arc<MirrorContext>,
}

impl RenameReceiver {
    pub fn new(ctx: Arc<MirrorContext>) -> Self {
        Self { ctx }
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(SyncError::io_at("create directory", parent))?;
    }
    Ok(())
}

#[async_trait]
impl ReceiverStrategy for RenameReceiver {
    async fn process(&self, header: &DialogHeader, dialog: &mut ServerDialog) -> Result<ReceiveReport> {
        let new_name = dialog.read_string().await?;
        let from = self.ctx.resolve(&header.relative_path)?;
        let to = self.ctx.resolve(&new_name)?;

        let source = tokio::fs::symlink_metadata(&from).await;
        let meta = match source {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SyncError::SourceNotFound(from));
            }
            Err(e) => return Err(SyncError::io_at("stat", &from)(e)),
        };

        if meta.is_dir() {
            let existing = tokio::fs::symlink_metadata(&to).await;
            match existing {
                Ok(existing) if existing.is_dir() => {
                    tokio::fs::remove_dir_all(&to)
                        .await
                        .map_err(SyncError::io_at("remove directory", &to))?;
                }
                Ok(_) => return Err(SyncError::DestinationExists(to)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(SyncError::io_at("stat", &to)(e)),
            }
        } else if tokio::fs::try_exists(&to)
            .await
            .map_err(SyncError::io_at("stat", &to))?
        {
            return Err(SyncError::DestinationExists(to));
        }

        ensure_parent(&to).await?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(SyncError::io_at("rename", &from))?;

        debug!("Renamed {} -> {}", header.relative_path, new_name);
        Ok(ReceiveReport::default())
    }
}
