//! Error type for server registration, admission, and startup.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by the server's programmatic API.
///
/// Service faults are not represented here: they are `anyhow::Error`s (or
/// panics) contained at the connection boundary and only logged.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("port {port} already in use")]
    PortInUse { port: u16 },
    #[error("connection refused: server has reached its maximum of {max} connections")]
    CapacityExceeded { max: usize },
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("unknown service: {name}")]
    UnknownService { name: String },
    #[error("no service bound to port {port}")]
    NotFound { port: u16 },
    #[error("invalid control spec {input:?}, expected <password>:<port>")]
    InvalidControl { input: String },
    #[error("failed to write pid file {}: {source}", path.display())]
    PidFile { path: PathBuf, source: io::Error },
}
