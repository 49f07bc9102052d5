//! Mirror a watched directory to a remote output directory over TCP.
//!
//! The client side watches a tree, coalesces raw filesystem events in an
//! [`EventChannel`](watch::EventChannel) and ships each surviving
//! [`Operation`](operation::Operation) over its own connection. The server
//! side rebuilds changed files from fixed-size segments, pulling any segment
//! it has seen before from a content-addressed cache instead of the network.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hash;
pub mod operation;
pub mod protocol;
pub mod receive;
pub mod transfer;
pub mod transport;
pub mod watch;

pub use config::Config;
pub use dispatch::{DispatchSummary, ReceiveDispatcher, SyncDispatcher};
pub use error::{Result, SyncError};
pub use hash::{Digest, HashAlgorithm};
pub use operation::{FileAction, FileType, Operation, OperationKind};
