//! Both ends of the pipeline: the client drains operations into outbound
//! dialogs, the server turns inbound dialogs into filesystem changes.

pub mod client;
pub mod file_lock;
pub mod path_locks;
pub mod server;

pub use client::{DispatchSummary, SyncDispatcher};
pub use path_locks::{PathGuard, PathLocks, PathTicket};
pub use server::ReceiveDispatcher;
