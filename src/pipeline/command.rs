//! Command parser: normalized subject → `(task, parameter)`.

use crate::error::ParseError;

/// Reserved administrative subject, never split.
pub const INFODUMP: &str = "infodump";

/// Separates task from parameter.
pub const SEPARATOR: char = ':';

/// A generic `task:parameter` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub task: String,
    pub parameter: String,
}

/// What a subject asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    InfoDump,
    Command(Command),
}

/// Parse a normalized subject.
///
/// `infodump` is recognized verbatim. Anything else needs exactly one
/// separator with non-empty text on both sides.
pub fn parse(subject: &str) -> Result<Request, ParseError> {
    if subject == INFODUMP {
        return Ok(Request::InfoDump);
    }

    let mut parts = subject.split(SEPARATOR);
    let (Some(task), Some(parameter), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ParseError::MalformedCommand(subject.to_string()));
    };

    let (task, parameter) = (task.trim(), parameter.trim());
    if task.is_empty() || parameter.is_empty() {
        return Err(ParseError::MalformedCommand(subject.to_string()));
    }

    Ok(Request::Command(Command {
        task: task.to_string(),
        parameter: parameter.to_string(),
    }))
}
