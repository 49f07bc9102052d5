//! Event coalescing between the watcher and the dispatcher.
//!
//! Native watchers emit several notifications for a single logical change,
//! so events are buffered per subject path and released as a snapshot once
//! per tick. Within a bucket only the last non-rename operation matters; any
//! renames after it are kept, in order.

use crate::operation::Operation;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Producer half of the coalesced operation queue.
pub type OperationSender = mpsc::UnboundedSender<Operation>;

/// Consumer half; `recv()` returns `None` once the ticker has shut down and
/// everything has been drained.
pub type OperationReceiver = mpsc::UnboundedReceiver<Operation>;

pub fn operation_queue() -> (OperationSender, OperationReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Default)]
pub struct EventChannel {
    // Keyed by subject path, in first-submission order.
    buckets: Mutex<IndexMap<String, Vec<Operation>>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one raw operation. Safe to call from any thread.
    pub fn submit(&self, op: Operation) {
        self.lock()
            .entry(op.relative_path.clone())
            .or_default()
            .push(op);
    }

    /// Number of buffered (not yet coalesced) operations.
    pub fn pending(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Take everything buffered so far and return the coalesced sequence.
    ///
    /// The buffer is emptied before the lock is released; the returned
    /// iterator owns the drained buckets and coalesces them lazily.
    pub fn snapshot(&self) -> impl Iterator<Item = Operation> {
        let buckets = std::mem::take(&mut *self.lock());
        buckets.into_values().flat_map(coalesce_bucket)
    }

    /// Snapshot every `period` into `queue` until `shutdown` flips to true,
    /// then flush once more and drop the queue sender.
    pub fn spawn_ticker(
        self: Arc<Self>,
        period: Duration,
        queue: OperationSender,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !self.publish(&queue) {
                            return;
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            self.publish(&queue);
            tracing::debug!("Event channel ticker stopped");
        })
    }

    /// Push one snapshot into the queue. Returns false if the consumer is gone.
    fn publish(&self, queue: &OperationSender) -> bool {
        let mut count = 0usize;
        for op in self.snapshot() {
            if queue.send(op).is_err() {
                tracing::warn!("Operation queue closed, dropping snapshot");
                return false;
            }
            count += 1;
        }
        if count > 0 {
            tracing::debug!("Snapshot released {} operations", count);
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Vec<Operation>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Reduce one bucket to its anchor (last non-rename) plus trailing renames.
fn coalesce_bucket(mut ops: Vec<Operation>) -> std::vec::IntoIter<Operation> {
    if ops.is_empty() {
        return ops.into_iter();
    }

    let mut anchor = ops.len() - 1;
    while ops[anchor].is_rename() && anchor > 0 {
        anchor -= 1;
    }

    let trailing_renames = ops[anchor..].iter().filter(|op| op.is_rename()).count();
    if trailing_renames > 1 {
        tracing::warn!(
            path = %ops[anchor].relative_path,
            renames = trailing_renames,
            "Multiple renames buffered under one path"
        );
    }

    ops.drain(..anchor);
    ops.into_iter()
}
