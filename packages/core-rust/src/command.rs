//! Control protocol commands.
//!
//! The control channel is line-oriented: the first whitespace-separated token
//! is the command (case-insensitive), the rest are its arguments. Each command
//! has a long form and the short aliases operators are used to typing.

use std::str::FromStr;

use crate::spec::{ServiceSpec, SpecError};

/// Errors from parsing a control line into a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unrecognized command: {command}")]
    Unknown { command: String },
    #[error("{command} requires an argument")]
    MissingArgument { command: &'static str },
    #[error("invalid number {value:?}")]
    InvalidNumber { value: String },
    #[error(transparent)]
    InvalidSpec(#[from] SpecError),
}

/// A parsed control protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// `PASSWORD <pw>` (aliases `PASSWD`, `PW`).
    Password(String),
    /// `ADD <name>:<port>` (alias `A`).
    Add(ServiceSpec),
    /// `REMOVE <port>` (alias `R`).
    Remove(u16),
    /// `MAX <n>` (alias `M`).
    Max(usize),
    /// `STATUS` (aliases `STAT`, `S`).
    Status,
    /// `HELP` (alias `?`).
    Help,
    /// `QUIT` (alias `Q`).
    Quit,
    /// `SHUTDOWN` (alias `STOP`).
    Shutdown,
}

impl ControlCommand {
    /// Parses one control line.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Empty`] for a blank line, [`ParseError::Unknown`]
    /// for an unrecognized first token, and the argument-specific variants when
    /// a command's argument is missing or malformed.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().ok_or(ParseError::Empty)?;
        let arg = tokens.next();

        match keyword.to_ascii_uppercase().as_str() {
            "PASSWORD" | "PASSWD" | "PW" => {
                let pw = arg.ok_or(ParseError::MissingArgument {
                    command: "PASSWORD",
                })?;
                Ok(Self::Password(pw.to_string()))
            }
            "ADD" | "A" => {
                let spec = arg.ok_or(ParseError::MissingArgument { command: "ADD" })?;
                Ok(Self::Add(spec.parse()?))
            }
            "REMOVE" | "R" => {
                let port = arg.ok_or(ParseError::MissingArgument { command: "REMOVE" })?;
                Ok(Self::Remove(parse_number(port)?))
            }
            "MAX" | "M" => {
                let max = arg.ok_or(ParseError::MissingArgument { command: "MAX" })?;
                Ok(Self::Max(parse_number(max)?))
            }
            "STATUS" | "STAT" | "S" => Ok(Self::Status),
            "HELP" | "?" => Ok(Self::Help),
            "QUIT" | "Q" => Ok(Self::Quit),
            "SHUTDOWN" | "STOP" => Ok(Self::Shutdown),
            _ => Err(ParseError::Unknown {
                command: keyword.to_string(),
            }),
        }
    }

    /// Whether the command may only run in an authenticated session.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Self::Add(_) | Self::Remove(_) | Self::Max(_) | Self::Status | Self::Shutdown
        )
    }

    /// Canonical keyword, used in logs.
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Password(_) => "PASSWORD",
            Self::Add(_) => "ADD",
            Self::Remove(_) => "REMOVE",
            Self::Max(_) => "MAX",
            Self::Status => "STATUS",
            Self::Help => "HELP",
            Self::Quit => "QUIT",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl FromStr for ControlCommand {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_number<T: FromStr>(value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_every_keyword_and_alias() {
        let cases = [
            ("PASSWORD secret", ControlCommand::Password("secret".into())),
            ("passwd secret", ControlCommand::Password("secret".into())),
            ("pw secret", ControlCommand::Password("secret".into())),
            ("ADD echo:9000", ControlCommand::Add(ServiceSpec::new("echo", 9000))),
            ("a time:13", ControlCommand::Add(ServiceSpec::new("time", 13))),
            ("remove 9000", ControlCommand::Remove(9000)),
            ("R 9000", ControlCommand::Remove(9000)),
            ("max 25", ControlCommand::Max(25)),
            ("m 1", ControlCommand::Max(1)),
            ("status", ControlCommand::Status),
            ("Stat", ControlCommand::Status),
            ("s", ControlCommand::Status),
            ("help", ControlCommand::Help),
            ("?", ControlCommand::Help),
            ("quit", ControlCommand::Quit),
            ("q", ControlCommand::Quit),
            ("shutdown", ControlCommand::Shutdown),
            ("STOP", ControlCommand::Shutdown),
        ];

        for (line, expected) in cases {
            assert_eq!(ControlCommand::parse(line), Ok(expected), "line: {line}");
        }
    }

    #[test]
    fn surrounding_whitespace_and_crlf_ignored() {
        assert_eq!(
            ControlCommand::parse("  status \r"),
            Ok(ControlCommand::Status)
        );
    }

    #[test]
    fn password_argument_keeps_case() {
        assert_eq!(
            ControlCommand::parse("PASSWORD MixedCase"),
            Ok(ControlCommand::Password("MixedCase".into()))
        );
    }

    #[test]
    fn blank_line_is_empty() {
        assert_eq!(ControlCommand::parse("   "), Err(ParseError::Empty));
    }

    #[test]
    fn unknown_command_reported() {
        assert_eq!(
            ControlCommand::parse("frobnicate now"),
            Err(ParseError::Unknown {
                command: "frobnicate".into()
            })
        );
    }

    #[test]
    fn missing_arguments_reported() {
        assert_eq!(
            ControlCommand::parse("PASSWORD"),
            Err(ParseError::MissingArgument {
                command: "PASSWORD"
            })
        );
        assert_eq!(
            ControlCommand::parse("add"),
            Err(ParseError::MissingArgument { command: "ADD" })
        );
        assert_eq!(
            ControlCommand::parse("max"),
            Err(ParseError::MissingArgument { command: "MAX" })
        );
    }

    #[test]
    fn malformed_arguments_reported() {
        assert!(matches!(
            ControlCommand::parse("max lots"),
            Err(ParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ControlCommand::parse("remove -1"),
            Err(ParseError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ControlCommand::parse("add echo"),
            Err(ParseError::InvalidSpec(SpecError::MissingSeparator { .. }))
        ));
    }

    #[test]
    fn privileged_commands_require_auth() {
        assert!(ControlCommand::Status.requires_auth());
        assert!(ControlCommand::Max(1).requires_auth());
        assert!(ControlCommand::Remove(1).requires_auth());
        assert!(ControlCommand::Add(ServiceSpec::new("echo", 1)).requires_auth());
        assert!(ControlCommand::Shutdown.requires_auth());

        assert!(!ControlCommand::Password("x".into()).requires_auth());
        assert!(!ControlCommand::Help.requires_auth());
        assert!(!ControlCommand::Quit.requires_auth());
    }

    proptest! {
        #[test]
        fn parse_never_panics(line in ".{0,64}") {
            let _ = ControlCommand::parse(&line);
        }

        #[test]
        fn keywords_are_case_insensitive(
            flips in proptest::collection::vec(any::<bool>(), 8)
        ) {
            let keyword: String = "shutdown"
                .chars()
                .zip(flips)
                .map(|(c, upper)| if upper { c.to_ascii_uppercase() } else { c })
                .collect();
            prop_assert_eq!(ControlCommand::parse(&keyword), Ok(ControlCommand::Shutdown));
        }

        #[test]
        fn max_accepts_any_usize(n in any::<usize>()) {
            prop_assert_eq!(ControlCommand::parse(&format!("MAX {n}")), Ok(ControlCommand::Max(n)));
        }
    }
}
