//! Server-wide shutdown coordination.
//!
//! Uses `ArcSwap` for lock-free health state transitions, a `watch` channel
//! that every connection's [`Session`](crate::service::Session) subscribes to,
//! and an atomic counter with RAII guards tracking connections still running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Server health state, transitioned by the shutdown controller.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Configured services are still being bound.
    Starting,
    /// All configured services are listening.
    Ready,
    /// Shutdown was requested; listeners are closing and connections ending.
    Draining,
    /// Teardown finished.
    Stopped,
}

/// Coordinates shutdown across listeners, connections and the binary.
///
/// 1. `trigger_shutdown()` moves to Draining and signals every session
/// 2. `wait_for_drain()` waits for running connections to end
/// 3. `mark_stopped()` releases everyone blocked in `wait_stopped()`
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    stopped: watch::Sender<bool>,
    active: Arc<AtomicU64>,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    /// Creates a new shutdown controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_signal, _rx) = watch::channel(false);
        let (stopped, _rx) = watch::channel(false);
        Self {
            shutdown_signal,
            stopped,
            active: Arc::new(AtomicU64::new(0)),
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Returns a receiver that flips to `true` when shutdown is triggered.
    ///
    /// Services select on it alongside their socket reads so a stuck client
    /// cannot hold the server open past the drain timeout.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Moves to `Draining` and signals all shutdown receivers.
    ///
    /// Returns `false` if shutdown had already been triggered.
    pub fn trigger_shutdown(&self) -> bool {
        let already = self.shutdown_signal.send_replace(true);
        if !already {
            self.health_state.store(Arc::new(HealthState::Draining));
        }
        !already
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_signal.borrow()
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Creates an RAII guard that counts a running connection.
    ///
    /// The counter is decremented when the guard drops, even if the service
    /// panicked, since Drop runs during unwinding.
    #[must_use]
    pub fn connection_guard(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Number of connections whose service is still running.
    #[must_use]
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Waits for all running connections to end, up to the given timeout.
    ///
    /// Returns `false` if the timeout expired with connections still running.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.active.load(Ordering::Relaxed) == 0 {
                return true;
            }

            if tokio::time::Instant::now() >= deadline {
                return false;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Transitions to `Stopped` and wakes every `wait_stopped()` caller.
    pub fn mark_stopped(&self) {
        self.health_state.store(Arc::new(HealthState::Stopped));
        self.stopped.send_replace(true);
    }

    /// Resolves once `mark_stopped()` has been called.
    pub async fn wait_stopped(&self) {
        let mut rx = self.stopped.subscribe();
        loop {
            let stopped = *rx.borrow_and_update();
            // The sender lives in `self`, so `changed` cannot fail here.
            if stopped || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the running-connection counter when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicU64>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}
