//! Server configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use cmdserver_core::ServiceSpec;

use crate::error::ServerError;

/// Top-level configuration, supplied by the launcher at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address every listener binds on.
    pub host: String,
    /// Initial cap on concurrently live connections across all services.
    pub max_connections: usize,
    /// Control service to start, if any.
    pub control: Option<ControlConfig>,
    /// Named services to start from the factory.
    pub services: Vec<ServiceSpec>,
    /// Where to write the process id. `None` skips the pid file.
    pub pid_file: Option<PathBuf>,
    /// How long shutdown waits for running connections to end.
    pub drain_timeout: Duration,
    /// Pause after a failed `accept()` before retrying.
    pub accept_error_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            max_connections: 10,
            control: None,
            services: Vec::new(),
            pid_file: None,
            drain_timeout: Duration::from_secs(5),
            accept_error_backoff: Duration::from_millis(100),
        }
    }
}

/// Password and port for the control service, written `password:port`.
///
/// No `Default` impl: there is no sensible default password. The password
/// must be a single non-empty token, since `PASSWORD <pw>` only reads one.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlConfig {
    pub password: String,
    pub port: u16,
}

impl fmt::Debug for ControlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlConfig")
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

impl ControlConfig {
    /// Whether a control client could ever log in with `password`.
    #[must_use]
    pub fn is_valid_password(password: &str) -> bool {
        !password.is_empty() && !password.chars().any(char::is_whitespace)
    }
}

impl FromStr for ControlConfig {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ServerError::InvalidControl {
            input: s.to_string(),
        };

        let (password, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        if !Self::is_valid_password(password) {
            return Err(invalid());
        }
        let port = port.trim().parse().map_err(|_| invalid())?;

        Ok(Self {
            password: password.to_string(),
            port,
        })
    }
}
