//! Server directives and line framing helpers.

use std::fmt;

use chat_core::DisplayName;
use thiserror::Error;

/// Default maximum length of a single client line, terminator included (64 KiB).
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

const SUBMIT_NAME: &str = "SUBMITNAME";
const NAME_ACCEPTED: &str = "NAMEACCEPTED";
const MESSAGE_PREFIX: &str = "MESSAGE ";
const MESSAGE_SEPARATOR: &str = ": ";

/// Lines the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Prompt for a display name. Sent on connect and after every rejected name.
    SubmitName,

    /// The last proposed name was accepted; broadcasts follow.
    NameAccepted,

    /// A chat line relayed from `name`.
    Message {
        /// Name of the sending session
        name: DisplayName,
        /// Text exactly as the sender typed it
        text: String,
    },
}

impl ServerLine {
    /// Creates a relay line for `text` sent by `name`.
    pub fn message(name: &DisplayName, text: impl Into<String>) -> Self {
        Self::Message {
            name: name.clone(),
            text: text.into(),
        }
    }

    /// Encodes the line for the wire, newline included.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = self.to_string();
        out.push('\n');
        out
    }

    /// Parses a line received from the server.
    ///
    /// Used by clients and tests. The line terminator is optional. For
    /// `MESSAGE` lines the name ends at the first `": "`, so a name that
    /// itself contains `": "` cannot be recovered exactly.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = strip_line_terminator(line);

        match line {
            SUBMIT_NAME => Ok(Self::SubmitName),
            NAME_ACCEPTED => Ok(Self::NameAccepted),
            _ => {
                let body = line
                    .strip_prefix(MESSAGE_PREFIX)
                    .ok_or_else(|| ProtocolError::UnknownDirective(line.to_string()))?;
                let (name, text) = body
                    .split_once(MESSAGE_SEPARATOR)
                    .ok_or_else(|| ProtocolError::MalformedMessage(line.to_string()))?;
                Ok(Self::Message {
                    name: DisplayName::new(name),
                    text: text.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubmitName => f.write_str(SUBMIT_NAME),
            Self::NameAccepted => f.write_str(NAME_ACCEPTED),
            Self::Message { name, text } => {
                write!(f, "{MESSAGE_PREFIX}{name}{MESSAGE_SEPARATOR}{text}")
            }
        }
    }
}

/// Strips one trailing `\n` or `\r\n` from a line read off the wire.
#[must_use]
pub fn strip_line_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Errors that can occur while framing or parsing protocol lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Unknown directive: {0:?}")]
    UnknownDirective(String),

    #[error("Malformed MESSAGE line: {0:?}")]
    MalformedMessage(String),

    #[error("Line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },
}
