//! Decoded protocol events.

use crate::frame::{Command, FrameError, FrameKind, STATUS_CHECK_REQUEST, STATUS_PASS, leading_int};

/// One received frame, decoded.
///
/// Fields a short (device response) frame does not carry keep their defaults:
/// no command, and group/device `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub command: Command,
    pub group_id: i32,
    pub device_id: i32,
    pub status_char: char,
    pub status_bool: bool,
    /// Response field with every space removed.
    pub response_text: String,
    pub response_int: i32,
}

impl Default for ParsedMessage {
    fn default() -> Self {
        Self {
            command: Command::Unknown('\0'),
            group_id: 0,
            device_id: 0,
            status_char: '\0',
            status_bool: false,
            response_text: String::new(),
            response_int: 0,
        }
    }
}

impl ParsedMessage {
    /// Decode one frame with its line terminator already removed.
    ///
    /// Only the length is validated. Missing fields fall back to defaults.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let kind = FrameKind::classify(bytes.len())?;
        let text = String::from_utf8_lossy(bytes);
        let mut fields = text.split(',');
        let mut msg = Self::default();

        if kind == FrameKind::Control {
            // preamble
            fields.next();
            if let Some(c) = fields.next().and_then(|f| f.chars().next()) {
                msg.command = Command::from_char(c);
            }
            if let Some(gid) = fields.next() {
                msg.group_id = leading_int(gid);
            }
            if let Some(did) = fields.next() {
                msg.device_id = leading_int(did);
            }
        }

        if let Some(c) = fields.next().and_then(|f| f.chars().next()) {
            msg.status_char = c;
            msg.status_bool = c == STATUS_PASS;
        }
        if let Some(resp) = fields.next() {
            msg.response_text = resp.chars().filter(|&c| c != ' ').collect();
            msg.response_int = leading_int(resp);
        }

        Ok(msg)
    }

    /// Is this payload a check-request?
    pub fn is_check_request(&self) -> bool {
        self.status_char == STATUS_CHECK_REQUEST
    }
}
