//! Client-side encoders: one strategy per action, each driving a
//! [`SenderDialog`](crate::protocol::SenderDialog) for a single operation.

pub mod change;
pub mod create;
pub mod delete;
pub mod rename;

pub use change::ChangeTransfer;
pub use create::CreateTransfer;
pub use delete::DeleteTransfer;
pub use rename::RenameTransfer;

use crate::config::Config;
use crate::error::Result;
use crate::hash::HashAlgorithm;
use crate::operation::{FileAction, Operation};
use crate::protocol::ClientDialog;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of one transfer, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Receiver already had an identical file
    pub unchanged: bool,
    /// Segments whose bytes went over the wire
    pub segments_sent: u64,
    /// Segments the receiver served from its cache
    pub segments_cached: u64,
}

#[async_trait]
pub trait TransferStrategy: Send + Sync {
    /// Write the full client half of the dialog for `op`. The caller closes
    /// the connection afterwards.
    async fn execute(&self, op: &Operation, dialog: &mut ClientDialog) -> Result<TransferReport>;
}

/// Strategy table keyed by action, built once at startup.
#[derive(Clone)]
pub struct TransferStrategies {
    create: Arc<dyn TransferStrategy>,
    change: Arc<dyn TransferStrategy>,
    delete: Arc<dyn TransferStrategy>,
    rename: Arc<dyn TransferStrategy>,
}

impl TransferStrategies {
    pub fn new(segment_size: usize, hash: HashAlgorithm) -> Self {
        let change = Arc::new(ChangeTransfer::new(segment_size, hash));
        Self {
            create: Arc::new(CreateTransfer::new(change.clone())),
            change,
            delete: Arc::new(DeleteTransfer),
            rename: Arc::new(RenameTransfer),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.segment_size, config.hash_algorithm)
    }

    pub fn get(&self, action: FileAction) -> &dyn TransferStrategy {
        match action {
            FileAction::Create => self.create.as_ref(),
            FileAction::Change => self.change.as_ref(),
            FileAction::Delete => self.delete.as_ref(),
            FileAction::Rename => self.rename.as_ref(),
        }
    }
}
