//! Create transfer: a directory is announced by its header alone; anything
//! else goes through the change flow.

use crate::error::Result;
use crate::operation::{FileType, Operation};
use crate::protocol::{ClientDialog, DialogHeader};
use crate::transfer::{ChangeTransfer, TransferReport, TransferStrategy};
use async_trait::async_trait;
use std::sync::Arc;

pub struct CreateTransfer {
    change: Arc<ChangeTransfer>,
}

impl CreateTransfer {
    pub fn new(change: Arc<ChangeTransfer>) -> Self {
        Self { change }
    }
}

#[async_trait]
impl TransferStrategy for CreateTransfer {
    async fn execute(&self, op: &Operation, dialog: &mut ClientDialog) -> Result<TransferReport> {
        if op.file_type == FileType::Directory {
            dialog.initiate(&DialogHeader::for_operation(op)).await?;
            return Ok(TransferReport::default());
        }
        self.change.execute(op, dialog).await
    }
}
