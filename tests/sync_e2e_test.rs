use std::fs;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use syncer::hash::HashAlgorithm;
use syncer::operation::Operation;
use syncer::receive::MirrorContext;
use syncer::transfer::TransferStrategies;
use syncer::watch::{operation_queue, DirectoryMonitor, EventChannel, OperationReceiver};
use syncer::{transport, ReceiveDispatcher, SyncDispatcher};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const SEGMENT: usize = 8;

struct TestServer {
    port: u16,
    mirror: TempDir,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<syncer::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let mirror = TempDir::new().unwrap();
        let listener = transport::bind("127.0.0.1", 0, 32).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let dispatcher = ReceiveDispatcher::new(MirrorContext::new(
            mirror.path(),
            SEGMENT,
            HashAlgorithm::Xxh3_128,
        ));
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { dispatcher.serve(listener, rx).await });

        Self {
            port,
            mirror,
            shutdown,
            handle,
        }
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.mirror.path().join(rel)
    }

    fn cache_entries(&self) -> usize {
        fs::read_dir(self.mirror.path().join(".syncer"))
            .map(|d| d.count())
            .unwrap_or(0)
    }

    fn dispatcher(&self) -> SyncDispatcher {
        SyncDispatcher::new(
            "127.0.0.1",
            self.port,
            4,
            TransferStrategies::new(SEGMENT, HashAlgorithm::Xxh3_128),
        )
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

fn queue_of(ops: Vec<Operation>) -> OperationReceiver {
    let (tx, rx) = operation_queue();
    for op in ops {
        tx.send(op).unwrap();
    }
    rx
}

fn write(root: &Path, rel: &str, contents: &[u8]) -> Operation {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    Operation::change(rel, path)
}

#[tokio::test]
async fn test_tree_mirrored_over_tcp() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let source = TempDir::new()?;

    fs::create_dir_all(source.path().join("docs/empty"))?;
    let ops = vec![
        Operation::create("docs", source.path().join("docs")),
        Operation::create("docs/empty", source.path().join("docs/empty")),
        write(source.path(), "docs/readme.md", b"# Title\n\nSome text that spans segments."),
        write(source.path(), "top.bin", &[7u8; 100]),
        write(source.path(), "blank.txt", b""),
    ];

    let summary = server.dispatcher().run(queue_of(ops)).await;
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 0);

    assert!(server.path("docs/empty").is_dir());
    assert_eq!(
        fs::read(server.path("docs/readme.md"))?,
        b"# Title\n\nSome text that spans segments."
    );
    assert_eq!(fs::read(server.path("top.bin"))?, vec![7u8; 100]);
    assert_eq!(fs::read(server.path("blank.txt"))?, b"");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_identical_content_reuses_cache() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let source = TempDir::new()?;
    let contents: Vec<u8> = (0..64u8).collect();

    let first = write(source.path(), "one.bin", &contents);
    server.dispatcher().run(queue_of(vec![first])).await;
    let cached = server.cache_entries();
    assert_eq!(cached, 64 / SEGMENT);

    let second = write(source.path(), "copy/two.bin", &contents);
    let summary = server.dispatcher().run(queue_of(vec![second])).await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(server.cache_entries(), cached);
    assert_eq!(fs::read(server.path("copy/two.bin"))?, contents);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_second_sync_of_unchanged_file_succeeds() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let source = TempDir::new()?;

    let op = write(source.path(), "stable.txt", b"does not change");
    server.dispatcher().run(queue_of(vec![op.clone()])).await;
    let summary = server.dispatcher().run(queue_of(vec![op])).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(fs::read(server.path("stable.txt"))?, b"does not change");
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_same_path_operations_apply_in_order() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let source = TempDir::new()?;

    // Change then Delete on each path: only dequeue order leaves nothing behind
    let mut ops = Vec::new();
    for i in 0..20 {
        let rel = format!("f{:02}.txt", i);
        ops.push(write(source.path(), &rel, &vec![i as u8; 200]));
        ops.push(Operation::delete(rel.clone(), source.path().join(&rel)));
    }

    let summary = server.dispatcher().run(queue_of(ops)).await;
    assert_eq!(summary.failed, 0);
    for i in 0..20 {
        assert!(!server.path(&format!("f{:02}.txt", i)).exists());
    }

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_rename_and_delete_mirrored() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let source = TempDir::new()?;

    let setup = vec![
        write(source.path(), "old.txt", b"moving"),
        write(source.path(), "doomed.txt", b"bye"),
    ];
    server.dispatcher().run(queue_of(setup)).await;

    fs::rename(source.path().join("old.txt"), source.path().join("new.txt"))?;
    fs::remove_file(source.path().join("doomed.txt"))?;
    let ops = vec![
        Operation::rename(
            "old.txt",
            source.path().join("old.txt"),
            "new.txt",
            source.path().join("new.txt"),
        ),
        Operation::delete("doomed.txt", source.path().join("doomed.txt")),
    ];
    let summary = server.dispatcher().run(queue_of(ops)).await;

    assert_eq!(summary.failed, 0);
    assert!(!server.path("old.txt").exists());
    assert_eq!(fs::read(server.path("new.txt"))?, b"moving");
    assert!(!server.path("doomed.txt").exists());
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_failure_does_not_stop_siblings() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let source = TempDir::new()?;

    let ops = vec![
        Operation::change("missing.txt", source.path().join("missing.txt")),
        write(source.path(), "fine.txt", b"ok"),
    ];
    let summary = server.dispatcher().run(queue_of(ops)).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(fs::read(server.path("fine.txt"))?, b"ok");
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_bad_dialog_does_not_stop_server() -> anyhow::Result<()> {
    let server = TestServer::start().await;

    let mut raw = transport::connect("127.0.0.1", server.port).await?;
    raw.write_all(&[99, 0, 0, 0, 0, 0, 0]).await?;
    raw.shutdown().await?;
    drop(raw);

    let source = TempDir::new()?;
    let op = write(source.path(), "after.txt", b"still serving");
    let summary = server.dispatcher().run(queue_of(vec![op])).await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(fs::read(server.path("after.txt"))?, b"still serving");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_watched_tree_flows_through_event_channel() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    let source = TempDir::new()?;
    fs::create_dir_all(source.path().join("a/b"))?;
    fs::write(source.path().join("a/b/leaf.txt"), b"leaf contents")?;
    fs::write(source.path().join("root.txt"), b"root contents")?;

    let channel = Arc::new(EventChannel::new());
    let (queue_tx, queue_rx) = operation_queue();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut monitor = DirectoryMonitor::new(source.path(), channel.clone())?;
    monitor.start().await?;
    let ticker = channel.spawn_ticker(Duration::from_millis(20), queue_tx, shutdown_rx);
    let dispatcher = server.dispatcher();
    let dispatch = tokio::spawn(async move { dispatcher.run(queue_rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    monitor.stop();
    shutdown_tx.send(true)?;
    ticker.await?;
    let summary = dispatch.await?;

    assert_eq!(summary.failed, 0);
    assert!(server.path("a/b").is_dir());
    assert_eq!(fs::read(server.path("a/b/leaf.txt"))?, b"leaf contents");
    assert_eq!(fs::read(server.path("root.txt"))?, b"root contents");
    server.stop().await;
    Ok(())
}

/// Server-side stream that counts itself as in flight until dropped.
struct Counted {
    inner: TcpStream,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncRead for Counted {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Counted {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[tokio::test]
async fn test_parallelism_caps_open_dialogs() -> anyhow::Result<()> {
    const PARALLELISM: usize = 3;
    const OPERATIONS: usize = 12;

    let mirror = TempDir::new()?;
    let listener = transport::bind("127.0.0.1", 0, 32).await?;
    let port = listener.local_addr()?.port();
    let receiver = Arc::new(ReceiveDispatcher::new(MirrorContext::new(
        mirror.path(),
        SEGMENT,
        HashAlgorithm::Xxh3_128,
    )));

    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let accept = {
        let (in_flight, peak) = (in_flight.clone(), peak.clone());
        tokio::spawn(async move {
            let mut handlers = Vec::new();
            for _ in 0..OPERATIONS {
                let (stream, _) = listener.accept().await.unwrap();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let stream = Counted {
                    inner: stream,
                    in_flight: in_flight.clone(),
                };
                let receiver = receiver.clone();
                handlers.push(tokio::spawn(async move {
                    // Keep the dialog open long enough for the client to pile up
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    receiver.handle(stream).await
                }));
            }
            for handler in handlers {
                handler.await.unwrap().unwrap();
            }
        })
    };

    let source = TempDir::new()?;
    let ops = (0..OPERATIONS)
        .map(|i| write(source.path(), &format!("p{:02}.txt", i), &vec![i as u8; 40]))
        .collect();
    let dispatcher = SyncDispatcher::new(
        "127.0.0.1",
        port,
        PARALLELISM,
        TransferStrategies::new(SEGMENT, HashAlgorithm::Xxh3_128),
    );
    let summary = dispatcher.run(queue_of(ops)).await;
    accept.await?;

    assert_eq!(summary.succeeded, OPERATIONS as u64);
    assert_eq!(summary.failed, 0);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= PARALLELISM, "{} dialogs open at once", peak);
    assert!(peak >= 2, "transfers never overlapped");
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    for i in 0..OPERATIONS {
        assert_eq!(fs::read(mirror.path().join(format!("p{:02}.txt", i)))?, vec![i as u8; 40]);
    }
    Ok(())
}
