//! The textual command surface.
//!
//! ```text
//! CREDIT <int>     append a credit
//! DEBIT <int>      append a debit
//! REPEAT <int>     repeat the event at a position
//! repeat           repeat the last event
//! undo             compensate the last event
//! list | rlist     show the stream oldest-first | newest-first
//! clean            stop, delete the checkpoint and the local event log
//! exit             stop
//! ```
//!
//! Keywords are case-insensitive. Blank input redraws the screen.

use std::str::FromStr;
use thiserror::Error;

/// A parsed command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `CREDIT <amount>`
    Credit(i64),
    /// `DEBIT <amount>`
    Debit(i64),
    /// `REPEAT <position>`
    RepeatAt(u64),
    /// `repeat`
    RepeatLast,
    /// `undo`
    Undo,
    /// `list`
    List,
    /// `rlist`
    ReverseList,
    /// `clean`
    Clean,
    /// `exit`
    Exit,
    /// Blank input
    Redraw,
}

/// Why a command line was rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseCommandError {
    /// Not a keyword, and not exactly a name and a parameter.
    #[error("Unknown command or Invalid number of parameters.")]
    InvalidArity,

    /// The parameter is not an integer.
    #[error("Command parameter not type int.")]
    NotAnInt,

    /// A name and an integer, but not a known name.
    #[error("Unknown Command")]
    UnknownCommand,

    /// `REPEAT` with a negative position.
    #[error("Event not found to repeat")]
    NoSuchPosition,
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Redraw);
        }

        match line.to_ascii_lowercase().as_str() {
            "clean" => return Ok(Self::Clean),
            "exit" => return Ok(Self::Exit),
            "repeat" => return Ok(Self::RepeatLast),
            "undo" => return Ok(Self::Undo),
            "list" => return Ok(Self::List),
            "rlist" => return Ok(Self::ReverseList),
            _ => {}
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [name, parameter] = tokens.as_slice() else {
            return Err(ParseCommandError::InvalidArity);
        };

        let parameter: i64 = parameter.parse().map_err(|_| ParseCommandError::NotAnInt)?;

        match name.to_ascii_uppercase().as_str() {
            "CREDIT" => Ok(Self::Credit(parameter)),
            "DEBIT" => Ok(Self::Debit(parameter)),
            "REPEAT" => u64::try_from(parameter)
                .map(Self::RepeatAt)
                .map_err(|_| ParseCommandError::NoSuchPosition),
            _ => Err(ParseCommandError::UnknownCommand),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn keywords_ignore_case() {
        assert_eq!("UNDO".parse::<Command>(), Ok(Command::Undo));
        assert_eq!("RList".parse::<Command>(), Ok(Command::ReverseList));
        assert_eq!("Repeat".parse::<Command>(), Ok(Command::RepeatLast));
        assert_eq!(" exit ".parse::<Command>(), Ok(Command::Exit));
        assert_eq!("clean".parse::<Command>(), Ok(Command::Clean));
        assert_eq!("list".parse::<Command>(), Ok(Command::List));
    }

    #[test]
    fn blank_line_redraws() {
        assert_eq!("".parse::<Command>(), Ok(Command::Redraw));
        assert_eq!("   \t".parse::<Command>(), Ok(Command::Redraw));
    }

    #[test]
    fn commands_with_parameter() {
        assert_eq!("credit 100".parse::<Command>(), Ok(Command::Credit(100)));
        assert_eq!("DEBIT -30".parse::<Command>(), Ok(Command::Debit(-30)));
        assert_eq!("repeat 2".parse::<Command>(), Ok(Command::RepeatAt(2)));
    }

    #[test]
    fn arity_is_checked_before_the_parameter() {
        assert_eq!(
            "credit".parse::<Command>(),
            Err(ParseCommandError::InvalidArity)
        );
        assert_eq!(
            "credit 1 2".parse::<Command>(),
            Err(ParseCommandError::InvalidArity)
        );
    }

    #[test]
    fn parameter_is_checked_before_the_name() {
        assert_eq!(
            "transfer ten".parse::<Command>(),
            Err(ParseCommandError::NotAnInt)
        );
        assert_eq!(
            "transfer 10".parse::<Command>(),
            Err(ParseCommandError::UnknownCommand)
        );
    }

    #[test]
    fn negative_repeat_position_is_not_found() {
        let error = "REPEAT -1".parse::<Command>().unwrap_err();
        assert_eq!(error, ParseCommandError::NoSuchPosition);
        assert_eq!(error.to_string(), "Event not found to repeat");
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            ParseCommandError::InvalidArity.to_string(),
            "Unknown command or Invalid number of parameters."
        );
        assert_eq!(
            ParseCommandError::NotAnInt.to_string(),
            "Command parameter not type int."
        );
        assert_eq!(ParseCommandError::UnknownCommand.to_string(), "Unknown Command");
    }
}
