//! Reply texts written back over the control channel.
//!
//! Replies are plain newline-terminated text with no framing. Clients match on
//! these strings, so changing one is a protocol change.

use crate::spec::ServiceSpec;

pub const LOGGED_IN: &str = "OK, logged in";
pub const INVALID_PASSWORD: &str = "invalid password";
pub const PASSWORD_REQUIRED: &str = "password required";
pub const ONLY_ONE_SESSION: &str = "only one control connection allowed";
pub const UNRECOGNIZED: &str = "unrecognized command";
pub const BYE: &str = "bye";
pub const TERMINATING: &str = "server is terminating";
pub const NO_SERVICES: &str = "no services to report status on";

/// Marks the end of a multi-line `STATUS` or `HELP` reply.
pub const END: &str = "END";

/// Lines returned by `HELP` / `?`.
pub const HELP: &[&str] = &[
    "supported commands:",
    "  PASSWORD <pw>      enter password (aliases PASSWD, PW)",
    "  STATUS             display services, connections and connection limit (STAT, S)",
    "  ADD <name>:<port>  add a named service on a port (A)",
    "  REMOVE <port>      remove the service running on a port (R)",
    "  MAX <n>            set the maximum number of connections (M)",
    "  HELP               display this menu (?)",
    "  QUIT               close this control session (Q)",
    "  SHUTDOWN           shut the server down (STOP)",
];

#[must_use]
pub fn service_added(spec: &ServiceSpec, bound_port: u16) -> String {
    format!("{} service added on port {bound_port}", spec.name)
}

#[must_use]
pub fn service_removed(port: u16) -> String {
    format!("service on port {port} removed")
}

#[must_use]
pub fn max_set(max: usize) -> String {
    format!("max connections set to {max}")
}

#[must_use]
pub fn error(reason: impl std::fmt::Display) -> String {
    format!("error: {reason}")
}
