//! Chunked transfer engine.
//!
//! A [`Transfer`] moves exactly its declared number of bytes between a
//! connection and a file, at most [`CHUNK_SIZE`] bytes at a time,
//! reporting progress after every chunk.

use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::codec::{CHUNK_SIZE, discard_exact};
use crate::error::{LanboxError, Result};

// ── ProgressSink ─────────────────────────────────────────────────

/// Receives `(bytes_done, total)` after each chunk.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, done: u64, total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn progress(&self, done: u64, total: u64) {
        self(done, total)
    }
}

// ── Transfer ─────────────────────────────────────────────────────

/// One in-flight file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Local file being written (receiver) or read (sender).
    pub path: PathBuf,
    /// Byte count announced in the frame header.
    pub declared: u64,
    /// Bytes moved so far.
    pub written: u64,
}

impl Transfer {
    pub fn new(path: impl Into<PathBuf>, declared: u64) -> Self {
        Self {
            path: path.into(),
            declared,
            written: 0,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.declared - self.written
    }

    pub fn is_complete(&self) -> bool {
        self.written == self.declared
    }

    /// Stream the declared payload from the connection into `file`.
    ///
    /// On a write failure the rest of the payload is still consumed from
    /// `reader`, so the connection stays aligned on the next frame, and a
    /// `Storage` error is returned. If the connection ends first, the bytes
    /// received so far stay in `file` and `TruncatedTransfer` is returned.
    pub async fn receive<R, W>(
        &mut self,
        reader: &mut R,
        file: &mut W,
        progress: &dyn ProgressSink,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut chunk = [0u8; CHUNK_SIZE];
        while !self.is_complete() {
            let want = self.remaining().min(CHUNK_SIZE as u64) as usize;
            let n = reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                if let Err(e) = file.flush().await {
                    warn!("flushing partial {} failed: {e}", self.path.display());
                }
                return Err(LanboxError::TruncatedTransfer {
                    expected: self.declared,
                    transferred: self.written,
                });
            }

            if let Err(e) = file.write_all(&chunk[..n]).await {
                discard_exact(reader, self.remaining() - n as u64).await?;
                return Err(LanboxError::storage(&self.path, e));
            }
            self.written += n as u64;
            progress.progress(self.written, self.declared);
        }

        file.flush()
            .await
            .map_err(|e| LanboxError::storage(&self.path, e))
    }

    /// Stream the declared number of bytes from `file` onto the connection.
    ///
    /// A file that ends early yields `TruncatedTransfer`; bytes beyond the
    /// declared length are never read.
    pub async fn send<R, W>(
        &mut self,
        file: &mut R,
        writer: &mut W,
        progress: &dyn ProgressSink,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut chunk = [0u8; CHUNK_SIZE];
        while !self.is_complete() {
            let want = self.remaining().min(CHUNK_SIZE as u64) as usize;
            let n = file
                .read(&mut chunk[..want])
                .await
                .map_err(|e| LanboxError::storage(&self.path, e))?;
            if n == 0 {
                return Err(LanboxError::TruncatedTransfer {
                    expected: self.declared,
                    transferred: self.written,
                });
            }

            writer.write_all(&chunk[..n]).await?;
            self.written += n as u64;
            progress.progress(self.written, self.declared);
        }

        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use tokio_test::io::Builder;

    fn ignore(_: u64, _: u64) {}

    fn recorder() -> (impl ProgressSink, std::sync::Arc<Mutex<Vec<(u64, u64)>>>) {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |done: u64, total: u64| seen.lock().unwrap().push((done, total))
        };
        (sink, seen)
    }

    #[tokio::test]
    async fn receive_reports_progress_per_chunk() {
        let payload = vec![7u8; 5000];
        let mut reader = &payload[..];
        let mut out = Vec::new();
        let (sink, seen) = recorder();

        let mut transfer = Transfer::new("x.bin", 5000);
        transfer.receive(&mut reader, &mut out, &sink).await.unwrap();

        assert_eq!(out, payload);
        assert!(transfer.is_complete());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(2048, 5000), (4096, 5000), (5000, 5000)]
        );
    }

    #[tokio::test]
    async fn receive_stops_at_declared_length() {
        let mut reader = &b"abcdefNEXT"[..];
        let mut out = Vec::new();
        let mut transfer = Transfer::new("x.bin", 6);
        transfer.receive(&mut reader, &mut out, &ignore).await.unwrap();
        assert_eq!(out, b"abcdef");
        assert_eq!(reader, b"NEXT");
    }

    #[tokio::test]
    async fn receive_keeps_partial_bytes_on_early_close() {
        let mut reader = Builder::new().read(b"hello").read(b" wor").build();
        let mut out = Vec::new();
        let mut transfer = Transfer::new("x.bin", 20);

        let err = transfer.receive(&mut reader, &mut out, &ignore).await.unwrap_err();
        assert!(matches!(
            err,
            LanboxError::TruncatedTransfer { expected: 20, transferred: 9 }
        ));
        assert_eq!(out, b"hello wor");
    }

    #[tokio::test]
    async fn receive_write_failure_drains_payload() {
        let mut reader = &b"0123456789NEXT"[..];
        let mut broken = Builder::new()
            .write_error(std::io::Error::other("disk full"))
            .build();
        let mut transfer = Transfer::new("x.bin", 10);

        let err = transfer.receive(&mut reader, &mut broken, &ignore).await.unwrap_err();
        assert!(matches!(err, LanboxError::Storage { .. }));
        assert_eq!(reader, b"NEXT");
    }

    #[tokio::test]
    async fn send_streams_declared_bytes_only() {
        let data = vec![1u8; 3000];
        let mut file = &data[..];
        let mut wire = Vec::new();
        let (sink, seen) = recorder();

        let mut transfer = Transfer::new("x.bin", 2500);
        transfer.send(&mut file, &mut wire, &sink).await.unwrap();

        assert_eq!(wire.len(), 2500);
        assert_eq!(*seen.lock().unwrap(), vec![(2048, 2500), (2500, 2500)]);
    }

    #[tokio::test]
    async fn send_detects_shrunk_file() {
        let mut file = &b"short"[..];
        let mut wire = Vec::new();
        let mut transfer = Transfer::new("x.bin", 100);
        assert!(matches!(
            transfer.send(&mut file, &mut wire, &ignore).await,
            Err(LanboxError::TruncatedTransfer { expected: 100, transferred: 5 })
        ));
    }
}
