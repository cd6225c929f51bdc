use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::{EchoService, Service, TimeService};
use crate::error::ServerError;

type Constructor = Arc<dyn Fn() -> Arc<dyn Service> + Send + Sync>;

// ---------------------------------------------------------------------------
// ServiceFactory
// ---------------------------------------------------------------------------

/// Fixed table from service name to constructor.
///
/// Populated at startup and consulted by the control `ADD` command and the
/// `--service` flag. Names are matched case-insensitively; a lookup never
/// evaluates anything beyond the registered constructor.
pub struct ServiceFactory {
    constructors: DashMap<String, Constructor>,
}

impl ServiceFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            constructors: DashMap::new(),
        }
    }

    /// Creates a factory with the built-in `echo` and `time` services.
    #[must_use]
    pub fn with_builtins() -> Self {
        let factory = Self::new();
        factory.register("echo", || Arc::new(EchoService));
        factory.register("time", || Arc::new(TimeService));
        factory
    }

    /// Registers `constructor` under `name`, replacing any previous entry.
    pub fn register<F>(&self, name: &str, constructor: F)
    where
        F: Fn() -> Arc<dyn Service> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.to_ascii_lowercase(), Arc::new(constructor));
    }

    /// Builds a fresh instance of the named service.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownService`] if no constructor is registered
    /// under `name`.
    pub fn create(&self, name: &str) -> Result<Arc<dyn Service>, ServerError> {
        let constructor = self
            .constructors
            .get(&name.to_ascii_lowercase())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ServerError::UnknownService {
                name: name.to_string(),
            })?;
        Ok(constructor())
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .constructors
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for ServiceFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ServiceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceFactory")
            .field("names", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
