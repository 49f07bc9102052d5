//! Watcher side input: native notifications are buffered and coalesced in
//! [`EventChannel`] and released once per snapshot tick.

pub mod channel;
#[cfg(feature = "watch")]
pub mod monitor;

pub use channel::{operation_queue, EventChannel, OperationReceiver, OperationSender};
#[cfg(feature = "watch")]
pub use monitor::DirectoryMonitor;
