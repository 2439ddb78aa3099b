//! # lanbox-core
//!
//! Protocol library for lanbox, a one-way LAN drop box: a sender pushes
//! text and files to a receiver that accepts a single sender at a time.
//!
//! This crate contains:
//! - **Wire format**: request/response headers, reply literals, name rules
//! - **Codec**: bounded exact reads and `ResponseCodec` for framed responses
//! - **Registry**: the single-slot `SessionRegistry`
//! - **Naming**: the download directory and collision-safe file creation
//! - **Transfer**: chunked file streaming with progress reporting
//! - **Worker**: the receiver-side connection state machine
//! - **Requester**: the sender-side handshake, poll loop and transfers
//! - **Error**: `LanboxError`, a typed `thiserror` hierarchy

pub mod codec;
pub mod error;
pub mod header;
pub mod message;
pub mod naming;
pub mod registry;
pub mod requester;
pub mod transfer;
pub mod worker;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{CHUNK_SIZE, DEFAULT_MAX_RESPONSE_SIZE, ResponseCodec};
pub use error::{LanboxError, Result};
pub use header::{REQUEST_HEADER_SIZE, RequestHeader};
pub use message::{FrameType, HandshakeOutcome, validate_name};
pub use naming::{DEFAULT_DOWNLOAD_DIR, DownloadDir};
pub use registry::{
    ConnectionHandle, Registration, Rejection, SESSION_CAPACITY, Session, SessionRegistry,
};
pub use requester::{Requester, RequesterConfig, ResponseSink, TracingResponses};
pub use transfer::{ProgressSink, Transfer};
pub use worker::{
    CloseReason, ConnectionWorker, ReceiverEvents, TracingEvents, WorkerContext, WorkerState,
};
