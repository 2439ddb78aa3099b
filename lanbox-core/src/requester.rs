//! Sender side of a lanbox connection.
//!
//! A [`Requester`] performs the name handshake, then runs a background
//! poll loop that owns the read half while the caller pushes files and
//! text through the shared write half. Every frame is written under the
//! writer lock, so poll frames never interleave with a transfer.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{DEFAULT_MAX_RESPONSE_SIZE, ResponseCodec, encode_file_header, encode_request};
use crate::error::{LanboxError, Result};
use crate::message::{FrameType, HandshakeOutcome, POLL_PAYLOAD, validate_name};
use crate::transfer::{ProgressSink, Transfer};

/// Default pause between two poll frames.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

// ── Configuration ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RequesterConfig {
    pub poll_interval: Duration,
    pub max_response_size: usize,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

// ── ResponseSink ─────────────────────────────────────────────────

/// Receives every response frame read by the poll loop.
pub trait ResponseSink: Send + Sync + 'static {
    fn on_response(&self, payload: &[u8]);

    /// The poll loop has ended and the connection is closed.
    fn on_disconnect(&self) {}
}

/// Logs responses through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingResponses;

impl ResponseSink for TracingResponses {
    fn on_response(&self, payload: &[u8]) {
        info!("receiver: {}", String::from_utf8_lossy(payload));
    }

    fn on_disconnect(&self) {
        info!("peer disconnected");
    }
}

impl ResponseSink for mpsc::UnboundedSender<Bytes> {
    fn on_response(&self, payload: &[u8]) {
        // a dropped receiver only means nobody is listening any more
        let _ = self.send(Bytes::copy_from_slice(payload));
    }
}

// ── Requester ────────────────────────────────────────────────────

type SharedWriter<S> = Arc<Mutex<WriteHalf<S>>>;

pub struct Requester<S> {
    reader: Option<FramedRead<ReadHalf<S>, ResponseCodec>>,
    writer: SharedWriter<S>,
    closed: CancellationToken,
    config: RequesterConfig,
    poller: Option<JoinHandle<()>>,
}

impl Requester<TcpStream> {
    /// Open a TCP connection to a receiver.
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: RequesterConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        if let Ok(peer) = stream.peer_addr() {
            info!("connected to {peer}");
        }
        Ok(Self::new(stream, config))
    }
}

impl<S> Requester<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, config: RequesterConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let codec = ResponseCodec::with_max_frame_length(config.max_response_size);
        Self {
            reader: Some(FramedRead::new(read_half, codec)),
            writer: Arc::new(Mutex::new(write_half)),
            closed: CancellationToken::new(),
            config,
            poller: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed from either side.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(LanboxError::PeerClosed);
        }
        Ok(())
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Propose `name` and classify the receiver's answer.
    ///
    /// `NameTaken` leaves the connection open for another attempt;
    /// `ReceiverBusy` closes it.
    pub async fn handshake(&mut self, name: &str) -> Result<HandshakeOutcome> {
        validate_name(name)?;
        self.ensure_open()?;
        self.write_frame(name.as_bytes()).await?;

        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| LanboxError::protocol("handshake after polling started"))?;
        let reply = match reader.next().await {
            Some(reply) => reply?,
            None => {
                self.closed.cancel();
                return Err(LanboxError::PeerClosed);
            }
        };

        let outcome = HandshakeOutcome::classify(name, &reply)?;
        match &outcome {
            HandshakeOutcome::Accepted(name) => info!("registered as {name}"),
            HandshakeOutcome::ReceiverBusy => {
                warn!("receiver is busy with another device");
                self.shutdown_writer().await;
            }
            HandshakeOutcome::NameTaken => warn!("username {name} already taken"),
        }
        Ok(outcome)
    }

    /// Hand the read half to a background task that polls the receiver
    /// and forwards every response to `sink`.
    pub fn start_polling(&mut self, sink: Arc<dyn ResponseSink>) -> Result<()> {
        self.ensure_open()?;
        let reader = self
            .reader
            .take()
            .ok_or_else(|| LanboxError::protocol("poll loop already running"))?;
        let writer = Arc::clone(&self.writer);
        let closed = self.closed.clone();
        let interval = self.config.poll_interval;

        self.poller = Some(tokio::spawn(poll_loop(
            reader, writer, closed, interval, sink,
        )));
        Ok(())
    }

    /// Send a `Text` frame.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.ensure_open()?;
        let frame = encode_request(FrameType::Text, text.as_bytes())?;
        self.write_frame(&frame).await
    }

    /// Stream a file to the receiver, returning the number of bytes sent.
    ///
    /// The declared length is the size at open time. Once the header is
    /// on the wire any failure leaves the stream misaligned, so the
    /// connection is closed.
    pub async fn send_file(&self, path: impl AsRef<Path>, progress: &dyn ProgressSink) -> Result<u64> {
        self.ensure_open()?;
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LanboxError::protocol(format!("{} has no file name", path.display())))?;

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| LanboxError::storage(path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| LanboxError::storage(path, e))?;
        if !metadata.is_file() {
            return Err(LanboxError::storage(
                path,
                std::io::Error::new(ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        let size = metadata.len();
        let header = encode_file_header(size, &filename)?;
        debug!("sending {} ({size} bytes)", path.display());

        let mut writer = self.writer.lock().await;
        let mut transfer = Transfer::new(path, size);
        let mut sent = writer.write_all(&header).await.map_err(LanboxError::from);
        if sent.is_ok() {
            sent = transfer.send(&mut file, &mut *writer, progress).await;
        }

        if let Err(e) = sent {
            warn!("sending {} failed: {e}", path.display());
            self.closed.cancel();
            if let Err(e) = writer.shutdown().await {
                debug!("shutdown: {e}");
            }
            return Err(e);
        }
        Ok(transfer.written)
    }

    async fn shutdown_writer(&self) {
        self.closed.cancel();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("shutdown: {e}");
        }
    }

    /// Stop the poll loop and shut down the write half.
    pub async fn close(&mut self) {
        self.shutdown_writer().await;
        if let Some(poller) = self.poller.take() {
            if let Err(e) = poller.await {
                warn!("poll loop panicked: {e}");
            }
        }
    }
}

async fn poll_loop<S>(
    mut reader: FramedRead<ReadHalf<S>, ResponseCodec>,
    writer: SharedWriter<S>,
    closed: CancellationToken,
    interval: Duration,
    sink: Arc<dyn ResponseSink>,
) where
    S: AsyncRead + AsyncWrite,
{
    match encode_request(FrameType::Poll, POLL_PAYLOAD) {
        Ok(poll) => loop {
            let sent = {
                let mut writer = writer.lock().await;
                match writer.write_all(&poll).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                }
            };
            if let Err(e) = sent {
                debug!("poll write failed: {e}");
                break;
            }

            let next = tokio::select! {
                _ = closed.cancelled() => break,
                next = reader.next() => next,
            };
            match next {
                Some(Ok(payload)) => sink.on_response(&payload),
                Some(Err(e)) => {
                    warn!("unreadable response: {e}");
                    break;
                }
                None => {
                    debug!("receiver closed the connection");
                    break;
                }
            }

            tokio::select! {
                _ = closed.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        },
        Err(e) => warn!("cannot encode poll frame: {e}"),
    }

    closed.cancel();
    if let Err(e) = writer.lock().await.shutdown().await {
        debug!("shutdown: {e}");
    }
    sink.on_disconnect();
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::codec::{encode_response, read_exact, read_filename, read_header};
    use crate::message::{REPLY_NAME_TAKEN, REPLY_RECEIVER_BUSY, REPLY_TEXT_RECEIVED};

    fn ignore(_: u64, _: u64) {}

    fn pair() -> (Requester<DuplexStream>, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let config = RequesterConfig {
            poll_interval: Duration::from_millis(10),
            ..RequesterConfig::default()
        };
        (Requester::new(client, config), server)
    }

    async fn answer_name(server: &mut DuplexStream, reply: &str) -> String {
        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        server.write_all(&encode_response(reply.as_bytes()).unwrap()).await.unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn handshake_accepted() {
        let (mut requester, mut server) = pair();
        let receiver = tokio::spawn(async move {
            let name = answer_name(&mut server, "alice").await;
            (name, server)
        });

        let outcome = requester.handshake("alice").await.unwrap();
        assert_eq!(outcome, HandshakeOutcome::Accepted("alice".into()));
        let (sent, _server) = receiver.await.unwrap();
        assert_eq!(sent, "alice");
        assert!(!requester.is_closed());
    }

    #[tokio::test]
    async fn handshake_name_taken_then_retry() {
        let (mut requester, mut server) = pair();
        let receiver = tokio::spawn(async move {
            answer_name(&mut server, REPLY_NAME_TAKEN).await;
            answer_name(&mut server, "bob").await;
            server
        });

        assert_eq!(requester.handshake("alice").await.unwrap(), HandshakeOutcome::NameTaken);
        assert_eq!(
            requester.handshake("bob").await.unwrap(),
            HandshakeOutcome::Accepted("bob".into())
        );
        receiver.await.unwrap();
    }

    #[tokio::test]
    async fn handshake_busy_closes() {
        let (mut requester, mut server) = pair();
        let receiver = tokio::spawn(async move {
            answer_name(&mut server, REPLY_RECEIVER_BUSY).await;
            server
        });

        assert_eq!(
            requester.handshake("alice").await.unwrap(),
            HandshakeOutcome::ReceiverBusy
        );
        assert!(requester.is_closed());
        assert!(matches!(
            requester.send_text("hi").await,
            Err(LanboxError::PeerClosed)
        ));
        receiver.await.unwrap();
    }

    #[tokio::test]
    async fn handshake_rejects_invalid_name_locally() {
        let (mut requester, _server) = pair();
        assert!(matches!(
            requester.handshake("no spaces").await,
            Err(LanboxError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn handshake_eof_is_peer_closed() {
        let (mut requester, server) = pair();
        drop(server);
        assert!(requester.handshake("alice").await.is_err());
    }

    #[tokio::test]
    async fn send_text_writes_text_frame() {
        let (requester, mut server) = pair();
        requester.send_text("hello").await.unwrap();

        let header = read_header(&mut server).await.unwrap();
        assert_eq!(header.frame_type, FrameType::Text);
        assert_eq!(read_exact(&mut server, header.length).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_file_writes_header_name_and_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("report.pdf");
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let (requester, mut server) = pair();
        let reader = tokio::spawn(async move {
            let header = read_header(&mut server).await.unwrap();
            let name = read_filename(&mut server).await.unwrap();
            let body = read_exact(&mut server, header.length).await.unwrap();
            (header, name, body)
        });

        let sent = requester.send_file(&path, &ignore).await.unwrap();
        assert_eq!(sent, 5000);

        let (header, name, body) = reader.await.unwrap();
        assert_eq!(header.frame_type, FrameType::File);
        assert_eq!(header.length, 5000);
        assert_eq!(name, "report.pdf");
        assert_eq!(body, content);
    }

    #[tokio::test]
    async fn missing_file_is_storage_error_and_keeps_connection() {
        let (requester, _server) = pair();
        assert!(matches!(
            requester.send_file("/definitely/not/here.bin", &ignore).await,
            Err(LanboxError::Storage { .. })
        ));
        assert!(!requester.is_closed());
    }

    #[tokio::test]
    async fn directory_is_refused_before_anything_is_sent() {
        let tmp = TempDir::new().unwrap();
        let (requester, mut server) = pair();

        assert!(matches!(
            requester.send_file(tmp.path(), &ignore).await,
            Err(LanboxError::Storage { .. })
        ));
        assert!(!requester.is_closed());

        // the next frame on the wire is the text, not a file header
        requester.send_text("after").await.unwrap();
        let header = read_header(&mut server).await.unwrap();
        assert_eq!(header.frame_type, FrameType::Text);
        assert_eq!(read_exact(&mut server, header.length).await.unwrap(), "after");
    }

    #[tokio::test]
    async fn poll_loop_forwards_responses_until_eof() {
        let (mut requester, mut server) = pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        requester.start_polling(Arc::new(tx)).unwrap();

        let header = read_header(&mut server).await.unwrap();
        assert_eq!(header.frame_type, FrameType::Poll);
        assert_eq!(read_exact(&mut server, header.length).await.unwrap(), POLL_PAYLOAD);

        server
            .write_all(&encode_response(REPLY_TEXT_RECEIVED.as_bytes()).unwrap())
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), REPLY_TEXT_RECEIVED);

        drop(server);
        tokio::time::timeout(Duration::from_secs(5), requester.closed())
            .await
            .unwrap();
        assert!(matches!(
            requester.send_text("late").await,
            Err(LanboxError::PeerClosed)
        ));
    }

    #[tokio::test]
    async fn close_stops_poll_loop() {
        let (mut requester, mut server) = pair();
        requester.start_polling(Arc::new(TracingResponses)).unwrap();
        read_header(&mut server).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), requester.close())
            .await
            .unwrap();
        assert!(requester.is_closed());
    }
}
