//! Listeners, connection admission, and shutdown control.

pub mod connection;
pub mod listener;
pub mod shutdown;

pub use connection::{ConnectionId, ConnectionManager};
pub use listener::Listener;
pub use shutdown::{ConnectionGuard, HealthState, ShutdownController};
