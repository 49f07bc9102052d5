use crate::error::{Result, SyncError};
use crate::operation::FileType;
use crate::protocol::{DialogHeader, ServerDialog};
use crate::receive::{ChangeReceiver, MirrorContext, ReceiveReport, ReceiverStrategy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Directories are created in place; files go through the change engine.
pub struct CreateReceiver {
    ctx: Arc<MirrorContext>,
    change: Arc<ChangeReceiver>,
}

impl CreateReceiver {
    pub fn new(ctx: Arc<MirrorContext>, change: Arc<ChangeReceiver>) -> Self {
        Self { ctx, change }
    }
}

#[async_trait]
impl ReceiverStrategy for CreateReceiver {
    async fn process(&self, header: &DialogHeader, dialog: &mut ServerDialog) -> Result<ReceiveReport> {
        if header.file_type != FileType::Directory {
            return self.change.process(header, dialog).await;
        }

        let dest = self.ctx.resolve(&header.relative_path)?;
        tokio::fs::create_dir_all(&dest)
            .await
            .map_err(SyncError::io_at("create directory", &dest))?;
        debug!("Created directory {}", header.relative_path);
        Ok(ReceiveReport::default())
    }
}
