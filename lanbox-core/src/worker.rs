//! Receiver-side connection worker.
//!
//! One worker owns one accepted connection for its whole lifetime and
//! drives it through the protocol:
//!
//! ```text
//!  AwaitingUsername ──► Active ──► Closed
//!        │  ▲
//!        │  └── name taken
//!        ▼
//!     Rejected ──────────────────► Closed
//! ```
//!
//! The session registry is the only state shared with other workers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::codec::{self, encode_response};
use crate::error::{LanboxError, Result};
use crate::header::RequestHeader;
use crate::message::{
    FrameType, REPLY_FILE_DOWNLOADED, REPLY_NAME_TAKEN, REPLY_RECEIVER_BUSY, REPLY_TEXT_RECEIVED,
    REPLY_TRANSFER_FAILED, validate_name,
};
use crate::naming::DownloadDir;
use crate::registry::{ConnectionHandle, Registration, Rejection, SessionRegistry};
use crate::transfer::Transfer;

// ── Events ───────────────────────────────────────────────────────

/// Where a worker surfaces what it receives.
pub trait ReceiverEvents: Send + Sync {
    /// A `Text` frame arrived from `sender`.
    fn on_text(&self, sender: &str, text: &[u8]);

    /// A chunk of a file was written.
    fn on_progress(&self, _path: &Path, _written: u64, _total: u64) {}

    /// A file was received completely.
    fn on_file_saved(&self, _sender: &str, _path: &Path, _size: u64) {}
}

/// Writes every event to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl ReceiverEvents for TracingEvents {
    fn on_text(&self, sender: &str, text: &[u8]) {
        info!("data from {sender}: {}", String::from_utf8_lossy(text));
    }

    fn on_progress(&self, path: &Path, written: u64, total: u64) {
        let percent = if total == 0 { 100 } else { written * 100 / total };
        debug!("{}: {percent}% downloaded", path.display());
    }

    fn on_file_saved(&self, sender: &str, path: &Path, size: u64) {
        info!("saved {} ({size} bytes) from {sender}", path.display());
    }
}

// ── Context ──────────────────────────────────────────────────────

/// Everything a worker needs besides its connection.
#[derive(Clone)]
pub struct WorkerContext {
    pub registry: Arc<SessionRegistry>,
    pub downloads: DownloadDir,
    pub events: Arc<dyn ReceiverEvents>,
    /// Longest wait for the next frame header; `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl WorkerContext {
    pub fn new(registry: Arc<SessionRegistry>, downloads: DownloadDir) -> Self {
        Self {
            registry,
            downloads,
            events: Arc::new(TracingEvents),
            idle_timeout: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn ReceiverEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

// ── WorkerState ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Waiting for the sender to propose a name.
    #[default]
    AwaitingUsername,
    /// Registered; serving request frames.
    Active { name: String },
    /// Refused because the slot is held.
    Rejected,
    /// Terminal.
    Closed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingUsername => write!(f, "AwaitingUsername"),
            Self::Active { name } => write!(f, "Active({name})"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Why a worker reached `Closed`.
#[derive(Debug)]
pub enum CloseReason {
    /// Another sender held the slot.
    Rejected,
    /// The peer disconnected between frames.
    PeerClosed,
    /// The connection handle was cancelled.
    Shutdown,
    /// A protocol, connection or timeout error.
    Failed(LanboxError),
}

impl From<LanboxError> for CloseReason {
    fn from(e: LanboxError) -> Self {
        match e {
            LanboxError::PeerClosed => CloseReason::PeerClosed,
            other => CloseReason::Failed(other),
        }
    }
}

// ── ConnectionWorker ─────────────────────────────────────────────

pub struct ConnectionWorker<S> {
    stream: S,
    handle: ConnectionHandle,
    ctx: WorkerContext,
    state: WorkerState,
}

impl<S> ConnectionWorker<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, handle: ConnectionHandle, ctx: WorkerContext) -> Self {
        Self {
            stream,
            handle,
            ctx,
            state: WorkerState::default(),
        }
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    /// Serve the connection until it closes, then release the session.
    pub async fn run(&mut self) -> CloseReason {
        let shutdown = self.handle.shutdown.clone();
        let reason = tokio::select! {
            reason = self.serve() => reason,
            _ = shutdown.cancelled() => CloseReason::Shutdown,
        };
        self.close().await;

        match &reason {
            CloseReason::Failed(e) => warn!(peer = %self.handle.peer, "connection closed: {e}"),
            other => info!(peer = %self.handle.peer, "connection closed: {other:?}"),
        }
        reason
    }

    async fn serve(&mut self) -> CloseReason {
        match self.handshake().await {
            Ok(true) => {}
            Ok(false) => return CloseReason::Rejected,
            Err(e) => return e.into(),
        }
        loop {
            if let Err(e) = self.next_frame().await {
                return e.into();
            }
        }
    }

    async fn close(&mut self) {
        debug!(peer = %self.handle.peer, "{} -> {}", self.state, WorkerState::Closed);
        if let WorkerState::Active { name } = &self.state {
            self.ctx.registry.release(name);
            info!(peer = %self.handle.peer, "released session {name}");
        }
        self.state = WorkerState::Closed;
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.handle.peer, "shutdown: {e}");
        }
    }

    fn sender_name(&self) -> &str {
        match &self.state {
            WorkerState::Active { name } => name,
            _ => "",
        }
    }

    async fn reply(&mut self, payload: &[u8]) -> Result<()> {
        let frame = encode_response(payload)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    // ── Handshake ────────────────────────────────────────────────

    /// Returns `false` when the connection must be closed as rejected.
    async fn handshake(&mut self) -> Result<bool> {
        loop {
            let raw = codec::read_unframed(&mut self.stream).await?;
            let name = std::str::from_utf8(&raw)?.to_string();
            validate_name(&name)?;
            debug!(peer = %self.handle.peer, "proposed username {name}");

            match self.ctx.registry.register(&name, self.handle.clone()) {
                Registration::Accepted => {
                    info!(peer = %self.handle.peer, "registered {name}");
                    self.state = WorkerState::Active { name: name.clone() };
                    self.reply(name.as_bytes()).await?;
                    return Ok(true);
                }
                Registration::Rejected(Rejection::AlreadyOccupied) => {
                    warn!(peer = %self.handle.peer, "refused {name}: receiver already in use");
                    self.state = WorkerState::Rejected;
                    self.reply(REPLY_RECEIVER_BUSY.as_bytes()).await?;
                    return Ok(false);
                }
                Registration::Rejected(Rejection::NameTaken) => {
                    debug!(peer = %self.handle.peer, "username {name} taken");
                    self.reply(REPLY_NAME_TAKEN.as_bytes()).await?;
                }
            }
        }
    }

    // ── Frames ───────────────────────────────────────────────────

    async fn read_header(&mut self) -> Result<RequestHeader> {
        match self.ctx.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, codec::read_header(&mut self.stream))
                .await
                .map_err(|_| LanboxError::Timeout(limit))?,
            None => codec::read_header(&mut self.stream).await,
        }
    }

    async fn next_frame(&mut self) -> Result<()> {
        let header = self.read_header().await?;
        debug!(
            "{} frame of {} bytes from {}",
            header.frame_type,
            header.length,
            self.sender_name()
        );

        match header.frame_type {
            FrameType::Text => {
                let text = codec::read_exact(&mut self.stream, header.length).await?;
                self.ctx.events.on_text(self.sender_name(), &text);
                self.reply(REPLY_TEXT_RECEIVED.as_bytes()).await
            }
            FrameType::File => self.receive_file(header.length).await,
            FrameType::Poll => codec::discard_exact(&mut self.stream, header.length).await,
        }
    }

    async fn receive_file(&mut self, length: u64) -> Result<()> {
        let raw_name = codec::read_filename(&mut self.stream).await?;
        match self.store_file(&raw_name, length).await {
            Ok(path) => {
                self.ctx.events.on_file_saved(self.sender_name(), &path, length);
                self.reply(REPLY_FILE_DOWNLOADED.as_bytes()).await
            }
            Err(e) if e.is_disconnect() => {
                warn!("transfer from {} aborted: {e}", self.sender_name());
                if let Err(reply_err) = self.reply(REPLY_TRANSFER_FAILED.as_bytes()).await {
                    debug!("failure reply not delivered: {reply_err}");
                }
                Err(e)
            }
            Err(e) => {
                warn!("transfer from {} failed: {e}", self.sender_name());
                self.reply(REPLY_TRANSFER_FAILED.as_bytes()).await
            }
        }
    }

    /// Materialize one file. On any error other than a disconnect the
    /// payload has been consumed and the connection is still aligned.
    async fn store_file(&mut self, raw_name: &[u8], length: u64) -> Result<PathBuf> {
        let opened = match std::str::from_utf8(raw_name) {
            Ok(name) => self.ctx.downloads.create_unique(name).await,
            Err(e) => Err(e.into()),
        };
        let (path, mut file) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                codec::discard_exact(&mut self.stream, length).await?;
                return Err(e);
            }
        };
        debug!("writing {length} bytes to {}", path.display());

        let events = Arc::clone(&self.ctx.events);
        let progress_path = path.clone();
        let progress =
            move |written: u64, total: u64| events.on_progress(&progress_path, written, total);

        let mut transfer = Transfer::new(path, length);
        transfer.receive(&mut self.stream, &mut file, &progress).await?;
        Ok(transfer.path)
    }
}
