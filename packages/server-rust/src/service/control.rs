//! Password-protected runtime administration over a line protocol.
//!
//! One session at a time. A session starts unauthenticated; `PASSWORD` moves
//! it to authenticated, after which `ADD`, `REMOVE`, `MAX`, `STATUS` and
//! `SHUTDOWN` are accepted. `HELP` and `QUIT` work in either state.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use cmdserver_core::{reply, ControlCommand, ParseError};
use futures_util::{SinkExt, StreamExt};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{shutdown_requested, Service, Session};
use crate::server::CommandServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// What to send back for one command and whether the session continues.
struct Outcome {
    lines: Vec<String>,
    end_session: bool,
}

impl Outcome {
    fn reply(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            end_session: false,
        }
    }

    fn block(lines: impl IntoIterator<Item = String>) -> Self {
        let mut lines: Vec<String> = lines.into_iter().collect();
        lines.push(reply::END.to_string());
        Self {
            lines,
            end_session: false,
        }
    }

    fn last(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            end_session: true,
        }
    }
}

/// The administrative service. Holds a weak handle to the server it controls
/// so the binding table does not keep the server alive.
pub struct ControlService {
    server: Weak<CommandServer>,
    password: String,
    session: Mutex<()>,
}

impl ControlService {
    #[must_use]
    pub fn new(server: Weak<CommandServer>, password: impl Into<String>) -> Self {
        Self {
            server,
            password: password.into(),
            session: Mutex::new(()),
        }
    }

    fn verify(&self, candidate: &str) -> bool {
        candidate
            .as_bytes()
            .ct_eq(self.password.as_bytes())
            .into()
    }

    async fn execute(&self, command: ControlCommand, state: &mut SessionState) -> Outcome {
        if let ControlCommand::Password(candidate) = &command {
            return if self.verify(candidate) {
                *state = SessionState::Authenticated;
                info!("control session authenticated");
                Outcome::reply(reply::LOGGED_IN)
            } else {
                warn!("control session supplied an invalid password");
                Outcome::reply(reply::INVALID_PASSWORD)
            };
        }

        if command.requires_auth() && *state != SessionState::Authenticated {
            return Outcome::reply(reply::PASSWORD_REQUIRED);
        }

        match command {
            ControlCommand::Help => Outcome::block(reply::HELP.iter().map(ToString::to_string)),
            ControlCommand::Quit => Outcome::last(reply::BYE),
            command => {
                let Some(server) = self.server.upgrade() else {
                    return Outcome::last(reply::error("server is no longer running"));
                };
                Self::administer(&server, command).await
            }
        }
    }

    async fn administer(server: &Arc<CommandServer>, command: ControlCommand) -> Outcome {
        match command {
            ControlCommand::Add(spec) => {
                match server.add_named_service(&spec.name, spec.port).await {
                    Ok(port) => Outcome::reply(reply::service_added(&spec, port)),
                    Err(e) => {
                        warn!(%spec, error = %e, "failed adding service");
                        Outcome::reply(reply::error(e))
                    }
                }
            }
            ControlCommand::Remove(port) => match server.remove_service(port).await {
                Ok(()) => Outcome::reply(reply::service_removed(port)),
                Err(e) => Outcome::reply(reply::error(e)),
            },
            ControlCommand::Max(max) => {
                server.manager().set_max_connections(max);
                Outcome::reply(reply::max_set(max))
            }
            ControlCommand::Status => Outcome::block(server.status().await.lines()),
            ControlCommand::Shutdown => {
                info!("shutdown requested over control channel");
                let server = Arc::clone(server);
                // Shutdown waits for running connections, including this one,
                // so it cannot run inside this session's task.
                tokio::spawn(async move { server.shutdown().await });
                Outcome::last(reply::TERMINATING)
            }
            ControlCommand::Password(_) | ControlCommand::Help | ControlCommand::Quit => {
                Outcome::reply(reply::UNRECOGNIZED)
            }
        }
    }
}

#[async_trait]
impl Service for ControlService {
    fn name(&self) -> &'static str {
        "control"
    }

    async fn serve(&self, session: Session) -> anyhow::Result<()> {
        let peer = session.peer;
        let (mut lines, mut shutdown) = session.into_lines();

        let Ok(_session_guard) = self.session.try_lock() else {
            warn!(%peer, "rejecting second control connection");
            lines.send(reply::ONLY_ONE_SESSION).await?;
            return Ok(());
        };

        info!(%peer, "control session opened");
        let mut state = SessionState::Unauthenticated;

        loop {
            let line = tokio::select! {
                line = lines.next() => line,
                () = shutdown_requested(&mut shutdown) => break,
            };
            let Some(line) = line else { break };
            let line = match line? {
                Ok(line) => line,
                Err(e) => {
                    warn!(%peer, "control line is not valid UTF-8");
                    lines.send(reply::error(e)).await?;
                    continue;
                }
            };

            let command = match ControlCommand::parse(&line) {
                Ok(command) => command,
                Err(ParseError::Empty) => continue,
                Err(ParseError::Unknown { command }) => {
                    warn!(%command, "unrecognized control command");
                    lines.send(reply::UNRECOGNIZED).await?;
                    continue;
                }
                Err(e) => {
                    lines.send(reply::error(e)).await?;
                    continue;
                }
            };
            debug!(command = command.keyword(), "control command");

            let outcome = self.execute(command, &mut state).await;
            for line in outcome.lines {
                lines.send(line).await?;
            }
            if outcome.end_session {
                break;
            }
        }

        info!(%peer, "control session closed");
        Ok(())
    }
}
