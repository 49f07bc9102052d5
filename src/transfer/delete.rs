use crate::error::Result;
use crate::operation::Operation;
use crate::protocol::{ClientDialog, DialogHeader};
use crate::transfer::{TransferReport, TransferStrategy};
use async_trait::async_trait;

/// Delete is header only; the receiver inspects its own copy to decide
/// between file and directory removal.
pub struct DeleteTransfer;

#[async_trait]
impl TransferStrategy for DeleteTransfer {
    async fn execute(&self, op: &Operation, dialog: &mut ClientDialog) -> Result<TransferReport> {
        dialog.initiate(&DialogHeader::for_operation(op)).await?;
        Ok(TransferReport::default())
    }
}
