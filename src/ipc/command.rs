//! Control command decoding.
//!
//! A command is at most [`MAX_COMMAND_BYTES`] of ASCII text. Everything from
//! the first carriage return or line feed onward is ignored, and the rest is
//! compared case-insensitively against `STOP`. Leading and interior
//! whitespace is significant.

/// Largest command payload read from one connection.
pub const MAX_COMMAND_BYTES: usize = 512;

/// The only recognized command word.
pub const STOP_COMMAND: &str = "STOP";

/// Decoded control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Request graceful shutdown of supervision.
    Stop,
    /// Nothing before the first line terminator.
    Empty,
    /// Any other content, kept for logging.
    Unrecognized(String),
}

/// Decode one raw command payload.
#[must_use]
pub fn parse_command(raw: &[u8]) -> ControlCommand {
    let end = raw
        .iter()
        .position(|b| matches!(b, b'\r' | b'\n'))
        .unwrap_or(raw.len());
    let line = &raw[..end];

    if line.is_empty() {
        return ControlCommand::Empty;
    }

    if line.eq_ignore_ascii_case(STOP_COMMAND.as_bytes()) {
        ControlCommand::Stop
    } else {
        ControlCommand::Unrecognized(String::from_utf8_lossy(line).into_owned())
    }
}
