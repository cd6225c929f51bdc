//! Top-level server: port bindings, connection manager, and lifecycle.
//!
//! Follows the deferred startup pattern: `new()` allocates shared state,
//! `start()` runs the reaper and binds the configured services, and
//! `shutdown()` tears everything down. Services can be added and removed at
//! any point in between, which is what the control service does.

use std::collections::BTreeMap;
use std::sync::Arc;

use cmdserver_core::{BindingStatus, StatusReport};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{ControlConfig, ServerConfig};
use crate::error::ServerError;
use crate::network::{ConnectionManager, HealthState, Listener, ShutdownController};
use crate::pid;
use crate::service::{ControlService, Service, ServiceFactory};

/// One active port binding.
pub struct ServiceBinding {
    pub port: u16,
    pub listener: Listener,
}

/// Registry of port bindings and entry point for runtime reconfiguration.
///
/// Passed around as `Arc<CommandServer>`; there is no global instance.
pub struct CommandServer {
    config: ServerConfig,
    manager: Arc<ConnectionManager>,
    shutdown: Arc<ShutdownController>,
    factory: ServiceFactory,
    bindings: Mutex<BTreeMap<u16, ServiceBinding>>,
}

impl CommandServer {
    /// Creates the server without binding any port.
    #[must_use]
    pub fn new(config: ServerConfig, factory: ServiceFactory) -> Arc<Self> {
        let shutdown = Arc::new(ShutdownController::new());
        let manager = Arc::new(ConnectionManager::new(
            config.max_connections,
            Arc::clone(&shutdown),
        ));
        Arc::new(Self {
            config,
            manager,
            shutdown,
            factory,
            bindings: Mutex::new(BTreeMap::new()),
        })
    }

    /// Starts the reaper, binds the configured control and named services,
    /// and writes the pid file.
    ///
    /// # Errors
    ///
    /// Returns the first registration or pid file error. Services bound
    /// before the failure stay bound; call [`shutdown`](Self::shutdown) to
    /// release them.
    pub async fn start(self: &Arc<Self>) -> Result<(), ServerError> {
        self.manager.start();

        if let Some(control) = &self.config.control {
            self.add_control(&control.password, control.port).await?;
        }
        for spec in &self.config.services {
            let port = self.add_named_service(&spec.name, spec.port).await?;
            info!(service = %spec.name, port, "added service");
        }
        if let Some(path) = &self.config.pid_file {
            pid::write(path)?;
        }

        self.shutdown.set_ready();
        Ok(())
    }

    #[must_use]
    pub fn manager(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.manager)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        self.shutdown.health_state()
    }

    /// Binds the control service on `port`. Returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidControl`] for a password no client could
    /// enter (empty or containing whitespace), and otherwise the errors of
    /// [`add_service`](Self::add_service).
    pub async fn add_control(
        self: &Arc<Self>,
        password: &str,
        port: u16,
    ) -> Result<u16, ServerError> {
        if !ControlConfig::is_valid_password(password) {
            return Err(ServerError::InvalidControl {
                input: format!("<redacted>:{port}"),
            });
        }
        let control = ControlService::new(Arc::downgrade(self), password);
        self.add_service(Arc::new(control), port).await
    }

    /// Starts a listener for `service` on `port` and records the binding.
    /// Returns the bound port, which differs from `port` when `port` is 0.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::PortInUse`] if this server already has a binding
    /// on `port`, [`ServerError::Bind`] if the OS refuses the port, and
    /// [`ServerError::ShuttingDown`] once shutdown has begun.
    pub async fn add_service(
        &self,
        service: Arc<dyn Service>,
        port: u16,
    ) -> Result<u16, ServerError> {
        let mut bindings = self.bindings.lock().await;
        if self.shutdown.is_shutting_down() {
            return Err(ServerError::ShuttingDown);
        }
        if port != 0 && bindings.contains_key(&port) {
            return Err(ServerError::PortInUse { port });
        }

        let listener = Listener::start(
            &self.config.host,
            port,
            service,
            Arc::clone(&self.manager),
            self.config.accept_error_backoff,
        )
        .await?;
        let port = listener.port();
        bindings.insert(port, ServiceBinding { port, listener });
        Ok(port)
    }

    /// Builds the named service from the factory and binds it on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownService`] for an unregistered name, and
    /// otherwise the errors of [`add_service`](Self::add_service).
    pub async fn add_named_service(&self, name: &str, port: u16) -> Result<u16, ServerError> {
        let service = self.factory.create(name)?;
        self.add_service(service, port).await
    }

    /// Stops the listener on `port` and discards its binding. Connections
    /// already accepted on the port keep running.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if nothing is bound on `port`.
    pub async fn remove_service(&self, port: u16) -> Result<(), ServerError> {
        let binding = self
            .bindings
            .lock()
            .await
            .remove(&port)
            .ok_or(ServerError::NotFound { port })?;

        binding.listener.stop().await;
        info!(
            port,
            service = binding.listener.service().name(),
            "removed service"
        );
        Ok(())
    }

    /// Bound ports in ascending order.
    pub async fn ports(&self) -> Vec<u16> {
        self.bindings.lock().await.keys().copied().collect()
    }

    /// Snapshot of bindings, their running connections, and the cap.
    pub async fn status(&self) -> StatusReport {
        let bindings = self.bindings.lock().await;
        let connections = self.manager.connections();

        StatusReport {
            bindings: bindings
                .values()
                .map(|binding| BindingStatus {
                    service: binding.listener.service().name(),
                    port: binding.port,
                    connections: connections
                        .iter()
                        .filter(|conn| conn.local_port == binding.port)
                        .cloned()
                        .collect(),
                })
                .collect(),
            max_connections: self.manager.max_connections(),
            live_connections: connections.len(),
        }
    }

    /// Stops every listener, signals running sessions, shuts down the
    /// connection manager and waits up to the drain timeout for connections
    /// to end. Later calls wait for the first one to finish.
    ///
    /// Does not exit the process; the binary does that once
    /// [`wait_for_shutdown`](Self::wait_for_shutdown) resolves.
    pub async fn shutdown(&self) {
        // Taken before triggering so a concurrent add_service either finishes
        // first or observes the trigger.
        let mut bindings = self.bindings.lock().await;
        if !self.shutdown.trigger_shutdown() {
            drop(bindings);
            self.shutdown.wait_stopped().await;
            return;
        }
        info!(bindings = bindings.len(), "server shutting down");

        let taken = std::mem::take(&mut *bindings);
        drop(bindings);
        for (port, binding) in taken {
            binding.listener.stop().await;
            info!(port, "listener released");
        }

        self.manager.shutdown().await;

        if self.shutdown.wait_for_drain(self.config.drain_timeout).await {
            info!("all connections ended");
        } else {
            warn!(
                remaining = self.shutdown.active_count(),
                "drain timeout expired with connections still running"
            );
        }

        if let Some(path) = &self.config.pid_file {
            pid::remove(path);
        }
        self.shutdown.mark_stopped();
        info!("server stopped");
    }

    /// Resolves once [`shutdown`](Self::shutdown) has completed, whoever
    /// triggered it.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown.wait_stopped().await;
    }
}
