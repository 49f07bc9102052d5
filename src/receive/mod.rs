//! Server-side decoders: one strategy per action, each consuming the rest of
//! a [`ReceiverDialog`](crate::protocol::ReceiverDialog) after the header
//! and applying the operation under the mirror root.

pub mod cache;
pub mod change;
pub mod create;
pub mod delete;
pub mod paths;
pub mod rename;

pub use cache::SegmentCache;
pub use change::ChangeReceiver;
pub use create::CreateReceiver;
pub use delete::DeleteReceiver;
pub use rename::RenameReceiver;

use crate::config::Config;
use crate::error::Result;
use crate::hash::HashAlgorithm;
use crate::operation::FileAction;
use crate::protocol::{DialogHeader, ServerDialog};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What the receiver did with one dialog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Existing file already matched; nothing was written
    pub unchanged: bool,
    pub segments_from_cache: u64,
    pub segments_from_network: u64,
}

/// Everything a receiver strategy needs besides the dialog itself.
#[derive(Debug, Clone)]
pub struct MirrorContext {
    pub root: PathBuf,
    pub segment_size: usize,
    pub hash: HashAlgorithm,
    pub cache: SegmentCache,
}

impl MirrorContext {
    pub fn new(root: impl Into<PathBuf>, segment_size: usize, hash: HashAlgorithm) -> Self {
        let root = root.into();
        Self {
            cache: SegmentCache::new(&root),
            root,
            segment_size,
            hash,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.mirror_root()?,
            config.segment_size,
            config.hash_algorithm,
        ))
    }

    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        paths::resolve(&self.root, relative)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
pub trait ReceiverStrategy: Send + Sync {
    /// Consume the remainder of the dialog whose header is `header` and
    /// apply it to the mirror.
    async fn process(&self, header: &DialogHeader, dialog: &mut ServerDialog) -> Result<ReceiveReport>;
}

/// Strategy table keyed by action, built once at startup.
#[derive(Clone)]
pub struct ReceiverStrategies {
    create: Arc<dyn ReceiverStrategy>,
    change: Arc<dyn ReceiverStrategy>,
    delete: Arc<dyn ReceiverStrategy>,
    rename: Arc<dyn ReceiverStrategy>,
}

impl ReceiverStrategies {
    pub fn new(ctx: Arc<MirrorContext>) -> Self {
        let change = Arc::new(ChangeReceiver::new(ctx.clone()));
        Self {
            create: Arc::new(CreateReceiver::new(ctx.clone(), change.clone())),
            change,
            delete: Arc::new(DeleteReceiver::new(ctx.clone())),
            rename: Arc::new(RenameReceiver::new(ctx)),
        }
    }

    pub fn get(&self, action: FileAction) -> &dyn ReceiverStrategy {
        match action {
            FileAction::Create => self.create.as_ref(),
            FileAction::Change => self.change.as_ref(),
            FileAction::Delete => self.delete.as_ref(),
            FileAction::Rename => self.rename.as_ref(),
        }
    }
}
