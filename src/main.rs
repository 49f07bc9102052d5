use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use syncer::config::Config;
use syncer::hash::HashAlgorithm;
use syncer::watch::{operation_queue, DirectoryMonitor, EventChannel};
use syncer::{transport, ReceiveDispatcher, SyncDispatcher};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "syncer")]
#[command(about = "Mirror a directory to a remote host with segment-level dedup", version)]
struct Cli {
    /// Config file (defaults to ./syncer.toml when present)
    #[arg(short, long, global = true, env = "SYNCER_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch a directory and send every change to the server
    Client(ClientArgs),
    /// Receive changes into an output directory
    Server(ServerArgs),
}

#[derive(Args)]
struct ConnectionArgs {
    /// Server address
    #[arg(long, env = "SYNCER_IP")]
    ip: Option<String>,

    #[arg(long, env = "SYNCER_PORT")]
    port: Option<u16>,

    /// Segment size in bytes; must match the peer
    #[arg(long, env = "SYNCER_SEGMENT_SIZE")]
    segment_size: Option<usize>,

    /// xxh3-128 or blake3; must match the peer
    #[arg(long, env = "SYNCER_HASH_ALGORITHM")]
    hash_algorithm: Option<HashAlgorithm>,
}

#[derive(Args)]
struct ClientArgs {
    /// Directory to watch
    #[arg(env = "SYNCER_DIRECTORY_PATH")]
    directory: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Maximum concurrent transfers
    #[arg(short = 'j', long, env = "SYNCER_DEGREE_OF_PARALLELISM")]
    parallelism: Option<usize>,

    /// Milliseconds between event snapshots
    #[arg(long, env = "SYNCER_SNAPSHOT_INTERVAL")]
    snapshot_interval: Option<u64>,

    /// Give up on a locked source file after this many probes
    #[arg(long, env = "SYNCER_LOCK_RETRY_LIMIT")]
    lock_retry_limit: Option<u32>,
}

#[derive(Args)]
struct ServerArgs {
    /// Directory to write into
    #[arg(env = "SYNCER_OUTPUT_DIRECTORY")]
    output: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long, env = "SYNCER_LISTEN_BACKLOG")]
    backlog: Option<u32>,
}

impl ConnectionArgs {
    fn apply(self, config: &mut Config) {
        if let Some(ip) = self.ip {
            config.ip = ip;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(size) = self.segment_size {
            config.segment_size = size;
        }
        if let Some(hash) = self.hash_algorithm {
            config.hash_algorithm = hash;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Client(args) => {
            if let Some(dir) = args.directory {
                config.directory_path = Some(dir);
            }
            if let Some(n) = args.parallelism {
                config.degree_of_parallelism = n;
            }
            if let Some(ms) = args.snapshot_interval.filter(|ms| *ms > 0) {
                config.snapshot_interval_ms = ms;
            }
            if args.lock_retry_limit.is_some() {
                config.lock_retry_limit = args.lock_retry_limit;
            }
            args.connection.apply(&mut config);
            config.validate()?;
            run_client(config).await
        }
        Command::Server(args) => {
            if let Some(dir) = args.output {
                config.output_directory = Some(dir);
            }
            if let Some(backlog) = args.backlog {
                config.listen_backlog = backlog;
            }
            args.connection.apply(&mut config);
            config.validate()?;
            run_server(config).await
        }
    }
}

async fn run_client(config: Config) -> Result<()> {
    let root = config.watch_root()?.to_path_buf();
    let channel = Arc::new(EventChannel::new());
    let (queue_tx, queue_rx) = operation_queue();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut monitor = DirectoryMonitor::new(&root, channel.clone())
        .with_context(|| format!("Cannot watch {}", root.display()))?;
    monitor.start().await?;

    let ticker = channel.spawn_ticker(config.snapshot_interval(), queue_tx, shutdown_rx);
    let dispatcher = SyncDispatcher::from_config(&config);
    let dispatch = tokio::spawn(async move { dispatcher.run(queue_rx).await });

    tracing::info!(
        "Syncing {} to {}:{} (segment {} bytes, {} parallel)",
        monitor.root().display(),
        config.ip,
        config.port,
        config.segment_size,
        config.degree_of_parallelism
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down, draining queued operations");

    monitor.stop();
    let _ = shutdown_tx.send(true);
    ticker.await.context("Event ticker panicked")?;
    let summary = dispatch.await.context("Dispatcher panicked")?;

    tracing::info!(
        "Done: {} operations sent, {} failed",
        summary.succeeded,
        summary.failed
    );
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let dispatcher = ReceiveDispatcher::from_config(&config)?;
    let root = dispatcher.context().root().to_path_buf();
    tokio::fs::create_dir_all(&root)
        .await
        .with_context(|| format!("Cannot create {}", root.display()))?;

    let listener = transport::bind(&config.ip, config.port, config.listen_backlog)
        .await
        .with_context(|| format!("Cannot listen on {}:{}", config.ip, config.port))?;
    tracing::info!("Mirroring into {}", root.display());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutting down, finishing open connections");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Ctrl-C handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    dispatcher.serve(listener, shutdown_rx).await?;
    Ok(())
}
