//! Fixed-width wire frames.
//!
//! Two frame sizes share one layout. The short form is the device response
//! sub-frame `<status>,<text>`; the control form wraps it:
//!
//! ```text
//! @,<cmd>,<gid>,<did>,<status>,<text>,#
//! ```
//!
//! `gid`/`did` are printed as `%04d` (`-1` becomes `-001`), and the text is
//! right-aligned in a [`RESP_TEXT_WIDTH`] column. Every control frame is exactly
//! [`SERIAL_RESP_SIZE`] bytes and is followed by `\r\n` on the wire.

use std::fmt;

/// Length of the `<status>,<text>` device response sub-frame.
pub const DEVICE_RESP_SIZE: usize = 22;

/// Width of the text column inside a device response.
pub const RESP_TEXT_WIDTH: usize = DEVICE_RESP_SIZE - 2;

/// Length of a control frame, excluding the line terminator.
pub const SERIAL_RESP_SIZE: usize = 38;

/// First field of every control frame.
pub const PREAMBLE: char = '@';

/// Last field of every control frame.
pub const TRAILER: char = '#';

/// Line terminator written after each frame.
pub const LINE_END: &str = "\r\n";

/// Status token asking the peer to confirm a result.
pub const STATUS_CHECK_REQUEST: char = 'C';
pub const STATUS_PASS: char = 'P';
pub const STATUS_FAIL: char = 'F';

/// Protocol verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `R`: boot announcement outbound, re-check request inbound.
    Ready,
    /// `O`: begin the run.
    Start,
    /// `C`: check-request.
    CheckRequest,
    /// `A`: acknowledgement of a status report.
    Ack,
    /// `S`: status report.
    Status,
    /// `X`: force stop.
    Stop,
    /// `E`: error summary lines.
    ErrorList,
    /// `B`: the server rebooted.
    Reboot,
    /// `M`: board hardware identifier.
    MacAddress,
    /// Anything else, kept verbatim.
    Unknown(char),
}

impl Command {
    pub fn from_char(c: char) -> Self {
        match c {
            'R' => Self::Ready,
            'O' => Self::Start,
            'C' => Self::CheckRequest,
            'A' => Self::Ack,
            'S' => Self::Status,
            'X' => Self::Stop,
            'E' => Self::ErrorList,
            'B' => Self::Reboot,
            'M' => Self::MacAddress,
            other => Self::Unknown(other),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Ready => 'R',
            Self::Start => 'O',
            Self::CheckRequest => 'C',
            Self::Ack => 'A',
            Self::Status => 'S',
            Self::Stop => 'X',
            Self::ErrorList => 'E',
            Self::Reboot => 'B',
            Self::MacAddress => 'M',
            Self::Unknown(c) => c,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(c) => write!(f, "{:?}", c),
            other => write!(f, "{}", other.as_char()),
        }
    }
}

/// Which of the two fixed sizes a byte sequence has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Control,
    DeviceResponse,
}

impl FrameKind {
    /// Classify by length alone.
    pub fn classify(len: usize) -> Result<Self, FrameError> {
        match len {
            SERIAL_RESP_SIZE => Ok(Self::Control),
            DEVICE_RESP_SIZE => Ok(Self::DeviceResponse),
            len => Err(FrameError::Length { len }),
        }
    }
}

/// Error decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame length {len} is neither {SERIAL_RESP_SIZE} nor {DEVICE_RESP_SIZE} bytes")]
    Length { len: usize },
}

/// The `<status>,<text>` payload a device check produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    status: char,
    text: String,
}

impl DeviceResponse {
    pub fn new(status: char, text: impl Into<String>) -> Self {
        Self {
            status: wire_char(status),
            text: text.into(),
        }
    }

    pub fn pass(text: impl Into<String>) -> Self {
        Self::new(STATUS_PASS, text)
    }

    pub fn fail(text: impl Into<String>) -> Self {
        Self::new(STATUS_FAIL, text)
    }

    pub fn check_request(text: impl Into<String>) -> Self {
        Self::new(STATUS_CHECK_REQUEST, text)
    }

    /// Payload used when a frame carries no device data (boot announcement).
    pub fn blank() -> Self {
        Self {
            status: ' ',
            text: String::new(),
        }
    }

    pub fn status(&self) -> char {
        self.status
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Does this payload ask the peer to confirm it?
    pub fn is_check_request(&self) -> bool {
        self.status == STATUS_CHECK_REQUEST
    }

    /// Encode to exactly [`DEVICE_RESP_SIZE`] bytes.
    pub fn encode(&self) -> String {
        let text: String = self
            .text
            .chars()
            .map(|c| if c == ',' || !is_wire_printable(c) { '_' } else { c })
            .take(RESP_TEXT_WIDTH)
            .collect();
        format!("{},{:>width$}", self.status, text, width = RESP_TEXT_WIDTH)
    }
}

/// One outbound control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub group_id: i32,
    pub device_id: i32,
    pub payload: DeviceResponse,
}

impl Frame {
    pub fn new(command: Command, group_id: i32, device_id: i32, payload: DeviceResponse) -> Self {
        Self {
            command,
            group_id,
            device_id,
            payload,
        }
    }

    /// The boot announcement: `R` with no item and no payload.
    pub fn boot() -> Self {
        Self::new(Command::Ready, -1, -1, DeviceResponse::blank())
    }

    /// Encode to exactly [`SERIAL_RESP_SIZE`] bytes, without the line terminator.
    pub fn encode(&self) -> String {
        let body_width = SERIAL_RESP_SIZE - 2;
        let mut body = format!(
            "{},{},{:04},{:04},{}",
            PREAMBLE,
            wire_char(self.command.as_char()),
            self.group_id,
            self.device_id,
            self.payload.encode()
        );
        body.truncate(body_width);
        format!("{:<width$},{}", body, TRAILER, width = body_width)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn is_wire_printable(c: char) -> bool {
    c.is_ascii_graphic() || c == ' '
}

fn wire_char(c: char) -> char {
    if c != ',' && is_wire_printable(c) { c } else { '?' }
}

/// Lenient integer read: optional leading whitespace and sign, then the
/// longest digit prefix. Anything unparsable is 0.
pub fn leading_int(s: &str) -> i32 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            (acc * 10 + i64::from(d - b'0')).min(i64::from(i32::MAX) + 1)
        });
    let value = if negative { -value } else { value };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
