use crate::error::{Result, SyncError};
use crate::protocol::{DialogHeader, ServerDialog};
use crate::receive::{MirrorContext, ReceiveReport, ReceiverStrategy};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tracing::debug;

/// Removes a file, or a directory with everything below it. A path that is
/// already gone is not an error.
pub struct DeleteReceiver {
    ctx: Arc<MirrorContext>,
}

impl DeleteReceiver {
    pub fn new(ctx: Arc<MirrorContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ReceiverStrategy for DeleteReceiver {
    async fn process(&self, header: &DialogHeader, _dialog: &mut ServerDialog) -> Result<ReceiveReport> {
        let dest = self.ctx.resolve(&header.relative_path)?;

        let meta = match tokio::fs::symlink_metadata(&dest).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} already absent", header.relative_path);
                return Ok(ReceiveReport::default());
            }
            Err(e) => return Err(SyncError::io_at("stat", &dest)(e)),
        };

        let removed = if meta.is_dir() {
            tokio::fs::remove_dir_all(&dest).await
        } else {
            tokio::fs::remove_file(&dest).await
        };
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::io_at("delete", &dest)(e)),
        }

        debug!("Deleted {}", header.relative_path);
        Ok(ReceiveReport::default())
    }
}
