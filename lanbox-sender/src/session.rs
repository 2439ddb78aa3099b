//! Interactive sender session: choose a name, then push files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, Lines};
use tracing::{info, warn};

use lanbox_core::{HandshakeOutcome, ProgressSink, Requester, Result, validate_name};

// ── Progress ─────────────────────────────────────────────────────

/// Logs transfer progress in 10% steps.
#[derive(Debug)]
pub struct ProgressLog {
    name: String,
    last_step: AtomicU64,
}

impl ProgressLog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_step: AtomicU64::new(0),
        }
    }
}

impl ProgressSink for ProgressLog {
    fn progress(&self, done: u64, total: u64) {
        let percent = if total == 0 { 100 } else { done * 100 / total };
        let step = percent / 10;
        if step > self.last_step.swap(step, Ordering::Relaxed) {
            info!("{}: {percent}% file sent", self.name);
        }
    }
}

// ── Registration ─────────────────────────────────────────────────

/// Offer names until one is accepted.
///
/// Starts with `name` when given, otherwise reads one from `input`.
/// Returns `None` when the receiver is busy or `input` runs out.
pub async fn register<S, R>(
    requester: &mut Requester<S>,
    name: Option<String>,
    input: &mut Lines<R>,
) -> Result<Option<String>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    R: AsyncBufRead + Unpin,
{
    let mut candidate = name;
    loop {
        let name = match candidate.take() {
            Some(name) => name,
            None => {
                println!("Select your username (max 20 alpha-numeric characters):");
                match input.next_line().await? {
                    Some(line) => line.trim().to_string(),
                    None => return Ok(None),
                }
            }
        };
        if let Err(e) = validate_name(&name) {
            println!("Invalid username: {e}");
            continue;
        }

        match requester.handshake(&name).await? {
            HandshakeOutcome::Accepted(name) => return Ok(Some(name)),
            HandshakeOutcome::ReceiverBusy => {
                println!("Receiver is already connected with another device");
                return Ok(None);
            }
            HandshakeOutcome::NameTaken => println!("Username already taken"),
        }
    }
}

// ── Sending ──────────────────────────────────────────────────────

/// Send one file. Errors that leave the connection usable are logged
/// and swallowed; the rest are returned.
pub async fn send_path<S>(requester: &Requester<S>, path: &Path) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let progress = ProgressLog::new(path.display().to_string());
    match requester.send_file(path, &progress).await {
        Ok(bytes) => {
            info!("sent {} ({bytes} bytes)", path.display());
            Ok(())
        }
        Err(e) if requester.is_closed() => Err(e),
        Err(e) => {
            warn!("cannot send {}: {e}", path.display());
            Ok(())
        }
    }
}

/// Read file paths from `input`, one per line, and send each until
/// `input` ends or the connection closes.
pub async fn send_from_input<S, R>(requester: &Requester<S>, input: &mut Lines<R>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    R: AsyncBufRead + Unpin,
{
    loop {
        println!("Enter File Path:");
        let line = tokio::select! {
            _ = requester.closed() => return Ok(()),
            line = input.next_line() => line?,
        };
        let Some(line) = line else { return Ok(()) };
        let path = line.trim();
        if path.is_empty() {
            continue;
        }
        send_path(requester, Path::new(path)).await?;
    }
}

/// Send `texts`, then `files`, then every path read from `input`.
///
/// Returns the first error that closed the connection; the caller still
/// owns closing the requester.
pub async fn send_all<S, R>(
    requester: &Requester<S>,
    texts: &[String],
    files: &[PathBuf],
    input: &mut Lines<R>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    R: AsyncBufRead + Unpin,
{
    for text in texts {
        requester.send_text(text).await?;
    }
    for path in files {
        send_path(requester, path).await?;
    }
    send_from_input(requester, input).await
}
