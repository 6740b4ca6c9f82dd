use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::present::Presenter;

/// Longest line the control server will read for a single command.
pub const MAX_COMMAND_LINE_BYTES: u64 = 256;

/// One-line command accepted on the loopback control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    Toggle,
    Show,
    Hide,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown control command {0:?}")]
pub struct UnknownCommand(pub String);

impl ControlCommand {
    pub const ALL: [ControlCommand; 3] = [Self::Toggle, Self::Show, Self::Hide];

    pub fn token(self) -> &'static str {
        match self {
            Self::Toggle => "TOGGLE",
            Self::Show => "SHOW",
            Self::Hide => "HIDE",
        }
    }

    /// The exact bytes a client writes: the token and a `\n`.
    pub fn wire_line(self) -> String {
        format!("{}\n", self.token())
    }

    /// Parses a received line. Surrounding whitespace is ignored and matching
    /// is case-insensitive; anything else yields `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        line.parse().ok()
    }

    pub fn apply<P: Presenter + ?Sized>(self, presenter: &mut P) {
        match self {
            Self::Toggle => presenter.toggle(),
            Self::Show => presenter.show(),
            Self::Hide => presenter.hide(),
        }
    }
}

impl FromStr for ControlCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::ALL
            .into_iter()
            .find(|command| command.token().eq_ignore_ascii_case(token))
            .ok_or_else(|| UnknownCommand(token.to_owned()))
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
