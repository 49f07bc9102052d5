use crate::error::{Result, SyncError};
use crate::operation::Operation;
use crate::protocol::{encode_string, ClientDialog, DialogHeader};
use crate::transfer::{TransferReport, TransferStrategy};
use async_trait::async_trait;

/// Rename: header for the old path, then the new relative path.
pub struct RenameTransfer;

#[async_trait]
impl TransferStrategy for RenameTransfer {
    async fn execute(&self, op: &Operation, dialog: &mut ClientDialog) -> Result<TransferReport> {
        let new_name = op.new_name().ok_or_else(|| {
            SyncError::Protocol(format!(
                "{} operation on {} has no new name",
                op.action(),
                op.relative_path
            ))
        })?;

        dialog.initiate(&DialogHeader::for_operation(op)).await?;
        dialog.send_bytes(&encode_string(new_name)).await?;
        Ok(TransferReport::default())
    }
}
