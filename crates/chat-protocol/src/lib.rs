//! Chat Protocol - Wire protocol for the chat server
//!
//! The protocol is line-oriented text: one directive or payload per
//! newline-terminated line. The server speaks three directives
//! (`SUBMITNAME`, `NAMEACCEPTED`, `MESSAGE <name>: <text>`); the client
//! sends bare lines, first a proposed name and then chat text.

pub mod line;

pub use line::{strip_line_terminator, ProtocolError, ServerLine, MAX_LINE_LENGTH};
