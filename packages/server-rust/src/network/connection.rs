//! Connection admission and lifecycle tracking.
//!
//! Every accepted socket from every listener goes through
//! [`ConnectionManager::add_connection`], which enforces the connection cap
//! under a single lock and spawns one task per admitted connection. Finished
//! connections are removed by a background reaper woken through a `Notify`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cmdserver_core::ConnectionInfo;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::shutdown::ShutdownController;
use crate::error::ServerError;
use crate::service::{Service, Session};

/// Unique identifier for a connection, assigned by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Record of one admitted connection.
///
/// The socket itself is owned by the connection task; the manager only keeps
/// metadata and the liveness flag the task clears when its service returns.
#[derive(Debug)]
struct Connection {
    info: ConnectionInfo,
    alive: Arc<AtomicBool>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct ManagerState {
    max_connections: usize,
    live: BTreeMap<ConnectionId, Connection>,
    terminating: bool,
}

/// Bounded registry of live connections across all services.
#[derive(Debug)]
pub struct ConnectionManager {
    state: Mutex<ManagerState>,
    reap_signal: Notify,
    next_id: AtomicU64,
    shutdown: Arc<ShutdownController>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Creates a manager with the given cap. Call [`start`](Self::start) to
    /// run the reaper.
    ///
    /// Connection IDs start at 1.
    #[must_use]
    pub fn new(max_connections: usize, shutdown: Arc<ShutdownController>) -> Self {
        info!(max_connections, "starting connection manager");
        Self {
            state: Mutex::new(ManagerState {
                max_connections,
                live: BTreeMap::new(),
                terminating: false,
            }),
            reap_signal: Notify::new(),
            next_id: AtomicU64::new(1),
            shutdown,
            reaper: Mutex::new(None),
        }
    }

    /// Spawns the reaper task. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut reaper = self.reaper.lock();
        if reaper.is_some() {
            return;
        }
        let manager = Arc::clone(self);
        *reaper = Some(tokio::spawn(async move { manager.reap_loop().await }));
    }

    /// Admits `stream` for `service` if the cap allows it.
    ///
    /// The capacity check, the spawn of the connection task and the insertion
    /// into the live set happen under one lock, so concurrent listeners can
    /// never jointly overshoot the cap.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::CapacityExceeded`] when the cap is reached and
    /// [`ServerError::ShuttingDown`] after [`shutdown`](Self::shutdown). In
    /// both cases the stream is dropped, closing the socket.
    pub fn add_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        service: Arc<dyn Service>,
    ) -> Result<ConnectionId, ServerError> {
        let local_port = stream.local_addr().map_or(0, |addr| addr.port());

        let mut state = self.state.lock();
        if state.terminating {
            drop(stream);
            warn!(%peer, "connection refused; server is shutting down");
            return Err(ServerError::ShuttingDown);
        }
        if state.live.len() >= state.max_connections {
            drop(stream);
            warn!(
                %peer,
                max_connections = state.max_connections,
                "connection refused; server has reached maximum number of clients"
            );
            return Err(ServerError::CapacityExceeded {
                max: state.max_connections,
            });
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let alive = Arc::new(AtomicBool::new(true));
        let info = ConnectionInfo {
            id: id.0,
            peer,
            local_port,
            service: service.name(),
        };
        let session = Session {
            id,
            peer,
            local_port,
            stream,
            shutdown: self.shutdown.shutdown_receiver(),
        };

        let guard = self.shutdown.connection_guard();
        let manager = Arc::clone(self);
        let flag = Arc::clone(&alive);
        tokio::spawn(async move {
            run_connection(service, session).await;
            flag.store(false, Ordering::Release);
            manager.end_connection();
            drop(guard);
        });

        info!(
            connection = id.0,
            %peer,
            port = local_port,
            service = info.service,
            "connection admitted"
        );
        state.live.insert(id, Connection { info, alive });
        Ok(id)
    }

    /// Called by a finishing connection. Only wakes the reaper; the live set
    /// is never touched from the connection's own task.
    pub fn end_connection(&self) {
        self.reap_signal.notify_one();
    }

    /// Changes the cap for subsequent admissions. Existing connections are
    /// not evicted when the cap drops below the live count.
    pub fn set_max_connections(&self, max_connections: usize) {
        let mut state = self.state.lock();
        info!(
            old = state.max_connections,
            new = max_connections,
            "max connections changed"
        );
        state.max_connections = max_connections;
    }

    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.state.lock().max_connections
    }

    /// Number of connections in the live set, including finished ones the
    /// reaper has not swept yet.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Metadata for every connection whose service is still running, ordered
    /// by id.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.state
            .lock()
            .live
            .values()
            .filter(|conn| conn.is_alive())
            .map(|conn| conn.info.clone())
            .collect()
    }

    /// Running connections accepted on `port`.
    #[must_use]
    pub fn connections_on(&self, port: u16) -> Vec<ConnectionInfo> {
        self.connections()
            .into_iter()
            .filter(|conn| conn.local_port == port)
            .collect()
    }

    /// One `CONNECTED TO <peer> ON PORT <port>` line per running connection.
    #[must_use]
    pub fn print_connections(&self) -> String {
        self.connections()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Stops admitting connections and waits for the reaper's final sweep.
    ///
    /// Running connections are not cancelled here; they observe the server's
    /// shutdown signal through their [`Session`].
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if state.terminating {
                return;
            }
            state.terminating = true;
            info!(live = state.live.len(), "connection manager shutting down");
        }
        self.reap_signal.notify_one();

        let reaper = self.reaper.lock().take();
        if let Some(handle) = reaper {
            if let Err(e) = handle.await {
                warn!(error = %e, "reaper task failed");
            }
        }
    }

    async fn reap_loop(&self) {
        loop {
            if self.reap() {
                debug!("reaper terminating");
                return;
            }
            // A notify_one issued between the sweep and this await is stored
            // as a permit, so no wake-up is lost.
            self.reap_signal.notified().await;
        }
    }

    /// Removes finished connections. Returns whether the manager is
    /// terminating.
    fn reap(&self) -> bool {
        let mut state = self.state.lock();
        state.live.retain(|id, conn| {
            let alive = conn.is_alive();
            if !alive {
                info!(
                    connection = id.0,
                    peer = %conn.info.peer,
                    service = conn.info.service,
                    "connection closed"
                );
            }
            alive
        });
        state.terminating
    }
}

/// Runs one service against one session, containing any fault.
async fn run_connection(service: Arc<dyn Service>, session: Session) {
    let id = session.id;
    let peer = session.peer;
    let name = service.name();

    match AssertUnwindSafe(service.serve(session)).catch_unwind().await {
        Ok(Ok(())) => debug!(connection = id.0, %peer, service = name, "service finished"),
        Ok(Err(e)) => warn!(
            connection = id.0,
            %peer,
            service = name,
            error = %e,
            "service ended with error"
        ),
        Err(_) => error!(
            connection = id.0,
            %peer,
            service = name,
            "service fault: serve panicked"
        ),
    }
}
