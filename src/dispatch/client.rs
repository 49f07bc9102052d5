//! Client dispatcher: drains the coalesced operation queue and runs one
//! transfer per operation, each over its own connection.

use crate::config::{Config, DEFAULT_LOCK_RETRY_INTERVAL_MS};
use crate::dispatch::file_lock;
use crate::dispatch::path_locks::PathLocks;
use crate::error::Result;
use crate::operation::{FileAction, FileType, Operation};
use crate::protocol::{ClientDialog, Connection, SenderDialog};
use crate::transfer::{TransferReport, TransferStrategies};
use crate::transport;
use crate::watch::OperationReceiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Totals for one [`SyncDispatcher::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub succeeded: u64,
    pub failed: u64,
}

impl DispatchSummary {
    fn record(&mut self, outcome: std::result::Result<Result<TransferReport>, tokio::task::JoinError>) {
        match outcome {
            Ok(Ok(_)) => self.succeeded += 1,
            Ok(Err(_)) => self.failed += 1,
            Err(e) => {
                error!("Transfer task failed: {}", e);
                self.failed += 1;
            }
        }
    }
}

/// Per-operation work shared by all worker tasks.
#[derive(Clone)]
struct Worker {
    ip: String,
    port: u16,
    strategies: TransferStrategies,
    lock_retry_interval: Duration,
    lock_retry_limit: Option<u32>,
}

impl Worker {
    async fn transfer(&self, mut op: Operation) -> Result<TransferReport> {
        op.file_type = FileType::probe(op.probe_path());

        if op.action() == FileAction::Change && op.file_type == FileType::Regular {
            let waited = file_lock::wait_until_unlocked(
                &op.absolute_path,
                self.lock_retry_interval,
                self.lock_retry_limit,
            )
            .await?;
            if waited > 0 {
                debug!("{} unlocked after {} probes", op.relative_path, waited);
            }
        }

        let stream = transport::connect(&self.ip, self.port).await?;
        let stream: Box<dyn Connection> = Box::new(stream);
        let mut dialog: ClientDialog = SenderDialog::new(stream);

        let report = self.strategies.get(op.action()).execute(&op, &mut dialog).await;
        let closed = dialog.finish().await;
        let report = report?;
        closed?;
        // Hold the path until the server has applied the operation
        dialog.wait_closed().await?;

        info!("Sent {} {}", op.action(), op.relative_path);
        Ok(report)
    }
}

pub struct SyncDispatcher {
    worker: Worker,
    parallelism: usize,
}

impl SyncDispatcher {
    pub fn new(ip: impl Into<String>, port: u16, parallelism: usize, strategies: TransferStrategies) -> Self {
        Self {
            worker: Worker {
                ip: ip.into(),
                port,
                strategies,
                lock_retry_interval: Duration::from_millis(DEFAULT_LOCK_RETRY_INTERVAL_MS),
                lock_retry_limit: None,
            },
            parallelism: parallelism.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ip.clone(),
            config.port,
            config.degree_of_parallelism,
            TransferStrategies::from_config(config),
        )
        .with_lock_retry(config.lock_retry_interval(), config.lock_retry_limit)
    }

    pub fn with_lock_retry(mut self, interval: Duration, limit: Option<u32>) -> Self {
        self.worker.lock_retry_interval = interval;
        self.worker.lock_retry_limit = limit;
        self
    }

    /// Consume `queue` until it closes, then wait for every in-flight
    /// transfer. At most `parallelism` transfers run at once; operations on
    /// the same path run one at a time in dequeue order.
    pub async fn run(&self, mut queue: OperationReceiver) -> DispatchSummary {
        let worker = Arc::new(self.worker.clone());
        let admission = Arc::new(Semaphore::new(self.parallelism));
        let locks = PathLocks::new();
        let mut tasks = JoinSet::new();
        let mut summary = DispatchSummary::default();

        while let Some(op) = queue.recv().await {
            while let Some(done) = tasks.try_join_next() {
                summary.record(done);
            }

            let permit = match admission.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let ticket = match op.new_name() {
                Some(new_name) => locks.reserve([op.relative_path.as_str(), new_name]).await,
                None => locks.reserve([op.relative_path.as_str()]).await,
            };
            debug!("Dequeued {} {}", op.action(), op.relative_path);

            let worker = worker.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let _guard = ticket.acquire().await;
                let action = op.action();
                let path = op.relative_path.clone();
                worker.transfer(op).await.map_err(|e| {
                    error!("Failed to {} {}: {}", action, path, e);
                    e
                })
            });
        }

        while let Some(done) = tasks.join_next().await {
            summary.record(done);
        }
        info!(
            "Dispatcher drained: {} succeeded, {} failed",
            summary.succeeded, summary.failed
        );
        summary
    }
}
