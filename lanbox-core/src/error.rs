//! Domain-specific error types for the lanbox protocol.
//!
//! All fallible operations return `Result<T, LanboxError>`.
//! No panics on peer input: every error is typed and recoverable by
//! whichever layer owns the connection.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LanboxError>;

/// The canonical error type for the lanbox protocol.
#[derive(Debug, Error)]
pub enum LanboxError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A header field, name or reply could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A response frame exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u64 },

    // ── Connection Errors ────────────────────────────────────────
    /// The peer closed the connection while more bytes were expected.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The channel closed before a declared payload was complete.
    ///
    /// `received` holds every byte collected before the close.
    #[error("truncated read: expected {expected} bytes, got {}", received.len())]
    TruncatedRead { expected: u64, received: Bytes },

    /// A file stream ended before its declared length.
    #[error("truncated transfer: expected {expected} bytes, transferred {transferred}")]
    TruncatedTransfer { expected: u64, transferred: u64 },

    /// No frame arrived within the configured idle window.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The TCP layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    // ── Storage Errors ───────────────────────────────────────────
    /// Creating or writing a file in the download directory failed.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Session Errors ───────────────────────────────────────────
    /// The receiver slot is already held by another sender.
    #[error("receiver is already connected with another device")]
    Capacity,

    /// The offered name is already registered.
    #[error("username already taken: {0}")]
    NameConflict(String),

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

impl LanboxError {
    /// Shorthand for [`LanboxError::Protocol`].
    pub fn protocol(msg: impl Into<String>) -> Self {
        LanboxError::Protocol(msg.into())
    }

    /// Wrap a filesystem error with the path it concerns.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LanboxError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` when the connection is gone and no further frames
    /// can be exchanged on it.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            LanboxError::PeerClosed
                | LanboxError::TruncatedRead { .. }
                | LanboxError::TruncatedTransfer { .. }
                | LanboxError::Connection(_)
                | LanboxError::Timeout(_)
        )
    }
}
