//! Per-path exclusive locks that are granted in reservation order.
//!
//! The dispatch loop calls [`PathLocks::reserve`] for each operation as it is
//! dequeued. Reserving polls tokio's fair mutex once, which either takes the
//! lock or puts the caller at the back of that path's wait queue. The
//! resulting [`PathTicket`] moves into the worker task and is redeemed there,
//! so same-path operations run in dequeue order even though the workers
//! themselves are scheduled freely.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::Poll;
use tokio::sync::OwnedMutexGuard;

/// Entries with no outstanding ticket are dropped once the map grows past
/// this many paths.
const PRUNE_THRESHOLD: usize = 1024;

type PathMutex = Arc<tokio::sync::Mutex<()>>;

enum Slot {
    Held(OwnedMutexGuard<()>),
    Queued(BoxFuture<'static, OwnedMutexGuard<()>>),
}

/// A place in line for one or more paths.
pub struct PathTicket {
    slots: Vec<Slot>,
}

/// Held path locks; released on drop.
pub struct PathGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl PathTicket {
    /// Whether every path was free at reservation time.
    pub fn is_ready(&self) -> bool {
        self.slots.iter().all(|s| matches!(s, Slot::Held(_)))
    }

    /// Wait until every reserved path is ours.
    pub async fn acquire(self) -> PathGuard {
        let mut guards = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            guards.push(match slot {
                Slot::Held(guard) => guard,
                Slot::Queued(fut) => fut.await,
            });
        }
        PathGuard { _guards: guards }
    }
}

#[derive(Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<String, PathMutex>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths with a live lock handle.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join the queue for each of `paths`, in the order given. Duplicates are
    /// reserved once.
    pub async fn reserve<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> PathTicket {
        let mut seen: Vec<&str> = Vec::new();
        let mut slots = Vec::new();
        for path in paths {
            if seen.contains(&path) {
                continue;
            }
            seen.push(path);

            let mut fut = self.handle(path).lock_owned().boxed();
            let slot = match futures::poll!(&mut fut) {
                Poll::Ready(guard) => Slot::Held(guard),
                Poll::Pending => Slot::Queued(fut),
            };
            slots.push(slot);
        }
        PathTicket { slots }
    }

    fn handle(&self, path: &str) -> PathMutex {
        let mut map = self.map();
        if map.len() > PRUNE_THRESHOLD {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        map.entry(path.to_string()).or_default().clone()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, PathMutex>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}
