//! Server dispatcher: one task per accepted connection, one dialog per task.

use crate::config::Config;
use crate::error::Result;
use crate::protocol::{Connection, ReceiverDialog, ServerDialog};
use crate::receive::{MirrorContext, ReceiveReport, ReceiverStrategies};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

pub struct ReceiveDispatcher {
    ctx: Arc<MirrorContext>,
    strategies: ReceiverStrategies,
}

impl ReceiveDispatcher {
    pub fn new(ctx: MirrorContext) -> Self {
        let ctx = Arc::new(ctx);
        Self {
            strategies: ReceiverStrategies::new(ctx.clone()),
            ctx,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(MirrorContext::from_config(config)?))
    }

    pub fn context(&self) -> &MirrorContext {
        &self.ctx
    }

    /// Run a single dialog to completion. The connection is closed when the
    /// dialog is dropped.
    pub async fn handle<S: Connection + 'static>(&self, stream: S) -> Result<ReceiveReport> {
        let stream: Box<dyn Connection> = Box::new(stream);
        let mut dialog: ServerDialog = ReceiverDialog::new(stream);
        handle_dialog(&self.strategies, &mut dialog).await
    }

    /// Accept connections until `shutdown` becomes true, then wait for the
    /// connections already in flight.
    pub async fn serve(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("Listening on {}", addr);
        }

        let mut tasks = JoinSet::new();
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("set_nodelay failed for {}: {}", peer, e);
                    }
                    let strategies = self.strategies.clone();
                    tasks.spawn(async move {
                        let stream: Box<dyn Connection> = Box::new(stream);
                        let mut dialog: ServerDialog = ReceiverDialog::new(stream);
                        let result = handle_dialog(&strategies, &mut dialog).await;
                        log_outcome(peer, &dialog, &result);
                        result
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = done {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        let in_flight = tasks.len();
        if in_flight > 0 {
            info!("Waiting for {} connection(s) to finish", in_flight);
        }
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                error!("Connection task failed: {}", e);
            }
        }
        Ok(())
    }
}

async fn handle_dialog(strategies: &ReceiverStrategies, dialog: &mut ServerDialog) -> Result<ReceiveReport> {
    let header = dialog.accept().await?;
    info!("Received {} {}", header.action, header.relative_path);
    strategies.get(header.action).process(&header, dialog).await
}

fn log_outcome(peer: SocketAddr, dialog: &ServerDialog, result: &Result<ReceiveReport>) {
    if let Err(e) = result {
        match dialog.header() {
            Some(h) => error!("Failed to apply {} {} from {}: {}", h.action, h.relative_path, peer, e),
            None => error!("Bad dialog from {}: {}", peer, e),
        }
    }
}
