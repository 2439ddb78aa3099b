//! Integration tests: sender and receiver talking over real TCP
//! connections on localhost.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lanbox_core::message::{REPLY_FILE_DOWNLOADED, REPLY_TEXT_RECEIVED};
use lanbox_core::{
    ConnectionHandle, ConnectionWorker, DownloadDir, HandshakeOutcome, Requester,
    RequesterConfig, SessionRegistry, WorkerContext,
};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

// ── Helpers ──────────────────────────────────────────────────────

struct Receiver {
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    downloads: PathBuf,
    _tmp: TempDir,
}

/// Accept connections on an OS-assigned port, one worker per connection.
async fn spawn_receiver() -> Receiver {
    let tmp = TempDir::new().unwrap();
    let downloads = tmp.path().join("Downloads");
    let registry = Arc::new(SessionRegistry::new());
    let ctx = WorkerContext::new(registry.clone(), DownloadDir::new(&downloads));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, peer)) = listener.accept().await {
            let mut worker = ConnectionWorker::new(stream, ConnectionHandle::new(peer), ctx.clone());
            tokio::spawn(async move {
                worker.run().await;
            });
        }
    });

    Receiver {
        addr,
        registry,
        downloads,
        _tmp: tmp,
    }
}

fn fast_config() -> RequesterConfig {
    RequesterConfig {
        poll_interval: Duration::from_millis(20),
        ..RequesterConfig::default()
    }
}

async fn connect(
    addr: SocketAddr,
    name: &str,
) -> (Requester<TcpStream>, mpsc::UnboundedReceiver<Bytes>) {
    let mut requester = Requester::connect(addr, fast_config()).await.unwrap();
    let outcome = requester.handshake(name).await.unwrap();
    assert_eq!(outcome, HandshakeOutcome::Accepted(name.to_string()));

    let (tx, rx) = mpsc::unbounded_channel();
    requester.start_polling(Arc::new(tx)).unwrap();
    (requester, rx)
}

async fn next_reply(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Bytes {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("timeout")
        .expect("poll loop ended")
}

fn ignore(_: u64, _: u64) {}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

// ── Transfers ────────────────────────────────────────────────────

#[tokio::test]
async fn file_round_trip_sizes() {
    let receiver = spawn_receiver().await;
    let (mut requester, mut replies) = connect(receiver.addr, "alice").await;
    let src = TempDir::new().unwrap();

    for size in [0usize, 1, 2048, 2049, 10_000_000] {
        let name = format!("blob{size}.bin");
        let path = src.path().join(&name);
        let content = pattern(size);
        std::fs::write(&path, &content).unwrap();

        let sent = requester.send_file(&path, &ignore).await.unwrap();
        assert_eq!(sent, size as u64);
        assert_eq!(next_reply(&mut replies).await, REPLY_FILE_DOWNLOADED);

        let received = std::fs::read(receiver.downloads.join(&name)).unwrap();
        assert_eq!(received.len(), size);
        assert!(received == content, "content mismatch for {size} bytes");
    }

    requester.close().await;
}

#[tokio::test]
async fn repeated_filename_gets_collision_suffixes() {
    let receiver = spawn_receiver().await;
    let (mut requester, mut replies) = connect(receiver.addr, "alice").await;
    let src = TempDir::new().unwrap();
    let path = src.path().join("report.pdf");
    let content = pattern(5000);
    std::fs::write(&path, &content).unwrap();

    for _ in 0..3 {
        requester.send_file(&path, &ignore).await.unwrap();
        assert_eq!(next_reply(&mut replies).await, REPLY_FILE_DOWNLOADED);
    }

    for name in ["report.pdf", "report(c1).pdf", "report(c2).pdf"] {
        assert_eq!(std::fs::read(receiver.downloads.join(name)).unwrap(), content);
    }
    requester.close().await;
}

#[tokio::test]
async fn text_is_acknowledged() {
    let receiver = spawn_receiver().await;
    let (mut requester, mut replies) = connect(receiver.addr, "alice").await;

    requester.send_text("hello receiver").await.unwrap();
    assert_eq!(next_reply(&mut replies).await, REPLY_TEXT_RECEIVED);
    requester.close().await;
}

// ── Sessions ─────────────────────────────────────────────────────

#[tokio::test]
async fn second_sender_is_refused_while_first_is_active() {
    let receiver = spawn_receiver().await;
    let (mut first, _replies) = connect(receiver.addr, "alice").await;

    let mut second = Requester::connect(receiver.addr, fast_config()).await.unwrap();
    assert_eq!(
        second.handshake("bob").await.unwrap(),
        HandshakeOutcome::ReceiverBusy
    );
    assert!(second.is_closed());
    assert_eq!(receiver.registry.current().unwrap().name, "alice");

    first.close().await;
}

#[tokio::test]
async fn slot_is_freed_when_sender_leaves() {
    let receiver = spawn_receiver().await;
    let (mut first, _replies) = connect(receiver.addr, "alice").await;
    first.close().await;

    // the worker notices the close asynchronously
    let mut freed = false;
    for _ in 0..100 {
        if receiver.registry.current().is_none() {
            freed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(freed, "session was never released");

    let (mut again, mut replies) = connect(receiver.addr, "alice").await;
    again.send_text("back").await.unwrap();
    assert_eq!(next_reply(&mut replies).await, REPLY_TEXT_RECEIVED);
    again.close().await;
}

#[tokio::test]
async fn close_all_disconnects_sender() {
    let receiver = spawn_receiver().await;
    let (requester, _replies) = connect(receiver.addr, "alice").await;

    assert_eq!(receiver.registry.close_all().len(), 1);
    tokio::time::timeout(Duration::from_secs(5), requester.closed())
        .await
        .expect("sender never saw the disconnect");
}
