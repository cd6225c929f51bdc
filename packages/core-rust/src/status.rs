//! Status report returned by the control `STATUS` command.

use std::fmt;
use std::net::SocketAddr;

/// Metadata about one live connection. Never includes the stream itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Id assigned by the connection manager.
    pub id: u64,
    /// Remote end of the connection.
    pub peer: SocketAddr,
    /// Locally bound port the client connected to.
    pub local_port: u16,
    /// Name of the service handling the connection.
    pub service: &'static str,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CONNECTED TO {} ON PORT {}", self.peer, self.local_port)
    }
}

/// One active port binding and the connections it currently serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingStatus {
    pub service: &'static str,
    pub port: u16,
    pub connections: Vec<ConnectionInfo>,
}

/// Snapshot of the server: bindings ordered by port plus the connection cap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub bindings: Vec<BindingStatus>,
    pub max_connections: usize,
    pub live_connections: usize,
}

impl StatusReport {
    /// Renders the report as reply lines, without the trailing `END` marker.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        if self.bindings.is_empty() {
            return vec![crate::reply::NO_SERVICES.to_string()];
        }

        let mut lines = Vec::new();
        for binding in &self.bindings {
            lines.push(format!(
                "SERVICE {} ON PORT {}",
                binding.service, binding.port
            ));
            lines.extend(binding.connections.iter().map(|c| format!("  {c}")));
        }
        lines.push(format!(
            "CONNECTIONS: {} MAX CONNECTIONS: {}",
            self.live_connections, self.max_connections
        ));
        lines
    }
}
