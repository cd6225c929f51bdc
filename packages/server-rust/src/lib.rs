//! `cmdserver` hosts pluggable TCP services on multiple ports with a bounded
//! connection pool and a password-protected control channel.

pub mod config;
pub mod error;
pub mod network;
pub mod pid;
pub mod server;
pub mod service;

pub use config::{ControlConfig, ServerConfig};
pub use error::ServerError;
pub use server::CommandServer;
pub use service::{Service, ServiceFactory, Session};
