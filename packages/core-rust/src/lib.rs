//! `cmdserver` core: control protocol commands, service specs and status reports.
//!
//! Nothing in this crate touches the network. The server crate parses control
//! lines with [`ControlCommand`], answers with the texts in [`reply`], and
//! renders [`StatusReport`] for the `STATUS` command.

pub mod command;
pub mod reply;
pub mod spec;
pub mod status;

pub use command::{ControlCommand, ParseError};
pub use spec::{ServiceSpec, SpecError};
pub use status::{BindingStatus, ConnectionInfo, StatusReport};
