//! Pluggable services and the factory that builds them by name.
//!
//! A [`Service`] is bound to one port by a listener and handles each accepted
//! connection in its own task:
//!
//! - **echo** (`echo`): echoes lines back until the client says `QUIT`
//! - **time** (`time`): writes the current time and hangs up
//! - **control** (`control`): password-protected runtime administration
//!
//! Embedders add their own services by implementing [`Service`] and
//! registering a constructor with [`ServiceFactory::register`].

pub mod control;
pub mod echo;
pub mod factory;
pub mod lines;
pub mod time;

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;

use crate::network::ConnectionId;

pub use control::ControlService;
pub use echo::EchoService;
pub use factory::ServiceFactory;
pub use lines::{Line, TextLines};
pub use time::TimeService;

/// Longest line the line-based services accept before failing the session.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Capability contract every port handler implements.
#[async_trait]
pub trait Service: Send + Sync {
    /// Type name shown by the control `STATUS` command.
    fn name(&self) -> &'static str;

    /// Handles one accepted connection until the client leaves or the service
    /// ends the session. Errors and panics are contained by the caller.
    async fn serve(&self, session: Session) -> anyhow::Result<()>;

    /// Called once when the owning listener stops.
    async fn close(&self) {}
}

/// One accepted client connection handed to [`Service::serve`].
#[derive(Debug)]
pub struct Session {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    /// Port the client connected to.
    pub local_port: u16,
    pub stream: TcpStream,
    /// Flips to `true` when the server shuts down.
    pub shutdown: watch::Receiver<bool>,
}

impl Session {
    /// Splits the session into a newline-delimited transport and the shutdown
    /// receiver.
    #[must_use]
    pub fn into_lines(self) -> (Framed<TcpStream, TextLines>, watch::Receiver<bool>) {
        let lines = Framed::new(self.stream, TextLines::new_with_max_length(MAX_LINE_LENGTH));
        (lines, self.shutdown)
    }
}

/// Resolves once the server has started shutting down.
///
/// Also resolves if the shutdown sender is gone, since the server owning it
/// no longer exists.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop || rx.changed().await.is_err() {
            return;
        }
    }
}
