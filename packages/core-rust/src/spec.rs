//! `name:port` service specifications.
//!
//! Used by the `ADD` control command and by the server's `--service` flag.

use std::fmt;
use std::str::FromStr;

/// Errors from parsing a `name:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("expected <name>:<port>, got {input:?}")]
    MissingSeparator { input: String },
    #[error("service name must not be empty")]
    EmptyName,
    #[error("invalid port {value:?}")]
    InvalidPort { value: String },
}

/// A service name paired with the port it should listen on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceSpec {
    /// Registered service name (e.g. `"echo"`). Stored lowercase.
    pub name: String,
    /// Port to bind. 0 asks the OS for an ephemeral port.
    pub port: u16,
}

impl ServiceSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            port,
        }
    }
}

impl FromStr for ServiceSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| SpecError::MissingSeparator {
                input: s.to_string(),
            })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(SpecError::EmptyName);
        }

        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| SpecError::InvalidPort {
                value: port.to_string(),
            })?;

        Ok(Self::new(name, port))
    }
}

impl fmt::Display for ServiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}
