//! Receiver service core logic.
//!
//! Owns the listening socket and the session registry. Every accepted
//! connection gets its own worker task; the registry decides which one
//! may become the active session.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use lanbox_core::{
    ConnectionHandle, ConnectionWorker, DownloadDir, Result, SessionRegistry, WorkerContext,
};

use crate::config::ReceiverConfig;

// ── ReceiverService ──────────────────────────────────────────────

pub struct ReceiverService {
    config: ReceiverConfig,
    registry: Arc<SessionRegistry>,
    stop: CancellationToken,
}

impl ReceiverService {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            stop: CancellationToken::new(),
        }
    }

    /// Cancel the returned token to stop the service.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Bind the configured address and serve until stopped.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until stopped or the listener
    /// fails. Either way every live session is closed before returning.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("receiver listening on {}", listener.local_addr()?);
        info!("saving files to {}", self.config.storage.download_dir.display());

        let ctx = WorkerContext::new(
            Arc::clone(&self.registry),
            DownloadDir::new(&self.config.storage.download_dir),
        )
        .with_idle_timeout(self.config.idle_timeout());

        let mut workers = JoinSet::new();
        let outcome = loop {
            let accept = tokio::select! {
                _ = self.stop.cancelled() => break Ok(()),
                Some(_) = workers.join_next(), if !workers.is_empty() => continue,
                accept = listener.accept() => accept,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    error!("accept failed: {e}");
                    break Err(e.into());
                }
            };
            debug!("connection from {peer}");

            let handle = ConnectionHandle {
                peer,
                shutdown: self.stop.child_token(),
            };
            let mut worker = ConnectionWorker::new(stream, handle, ctx.clone());
            workers.spawn(async move {
                worker.run().await;
            });
        };

        let closed = self.registry.close_all();
        for session in &closed {
            info!("closing session {}", session.name);
        }
        self.stop.cancel();
        while workers.join_next().await.is_some() {}
        info!("receiver stopped");
        outcome
    }
}
