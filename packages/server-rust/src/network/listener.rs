//! Per-port accept loop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::ConnectionManager;
use crate::error::ServerError;
use crate::service::Service;

/// Owns one bound TCP socket and the task accepting connections on it.
///
/// Every accepted socket is handed, together with the listener's service, to
/// the shared [`ConnectionManager`].
pub struct Listener {
    port: u16,
    service: Arc<dyn Service>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    /// Binds `host:port` and spawns the accept loop.
    ///
    /// Port 0 binds an OS-assigned port; [`port`](Self::port) reports the
    /// actual one.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound (port in
    /// use, permission denied).
    pub async fn start(
        host: &str,
        port: u16,
        service: Arc<dyn Service>,
        manager: Arc<ConnectionManager>,
        accept_error_backoff: Duration,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { port, source })?
            .port();

        info!(host, port, service = service.name(), "listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            port,
            Arc::clone(&service),
            manager,
            stop_rx,
            accept_error_backoff,
        ));

        Ok(Self {
            port,
            service,
            stop_tx,
            task: Mutex::new(Some(task)),
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    /// Stops accepting and waits until the listening socket is closed and
    /// `service.close()` has run. Idempotent.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(port = self.port, error = %e, "accept loop failed");
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    port: u16,
    service: Arc<dyn Service>,
    manager: Arc<ConnectionManager>,
    mut stop_rx: watch::Receiver<bool>,
    accept_error_backoff: Duration,
) {
    loop {
        tokio::select! {
            biased;
            // Also fires if the `Listener` was dropped without `stop()`.
            _ = stop_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(port, %peer, "accepted connection");
                    // Rejections are logged by the manager; the loop carries on.
                    let _ = manager.add_connection(stream, peer, Arc::clone(&service));
                }
                Err(e) => {
                    warn!(port, error = %e, "accept failed");
                    tokio::time::sleep(accept_error_backoff).await;
                }
            },
        }
    }

    drop(listener);
    service.close().await;
    info!(port, service = service.name(), "listener stopped");
}
