//! STOMP 1.2 frame model and text codec
//!
//! A frame is a command line, a block of `name:value` header lines, a blank
//! line, and a body terminated by a NUL octet:
//!
//! ```text
//! SUBSCRIBE
//! id:sub-0
//! destination:/topic/alpha/messages
//!
//! ^@
//! ```
//!
//! Header values are escaped (`\r`, `\n`, `\c`, `\\`) on every frame except
//! `CONNECT`, `STOMP` and `CONNECTED`, per STOMP 1.2. When a header is repeated,
//! the first occurrence wins.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use thiserror::Error;

/// Errors raised while decoding a frame
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Command line is not a STOMP command
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Command or header bytes are not UTF-8
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// Header line without a `:` separator
    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    /// Undefined escape sequence in a header
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    /// `content-length` is not a number or exceeds the frame
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    /// Frame ended before the NUL terminator
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,
}

/// STOMP client and server commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    /// Client opens a session
    Connect,
    /// STOMP 1.2 alias of CONNECT
    Stomp,
    /// Server accepts a session
    Connected,
    /// Client publishes to a destination
    Send,
    /// Client subscribes to a destination
    Subscribe,
    /// Client cancels a subscription
    Unsubscribe,
    /// Client acknowledges a message
    Ack,
    /// Client rejects a message
    Nack,
    /// Client starts a transaction
    Begin,
    /// Client commits a transaction
    Commit,
    /// Client aborts a transaction
    Abort,
    /// Client closes the session
    Disconnect,
    /// Server delivers a message
    Message,
    /// Server confirms a receipt
    Receipt,
    /// Server reports an error
    Error,
}

impl StompCommand {
    /// Wire name of the command
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// `CONNECT` or its `STOMP` alias
    pub fn is_connect(self) -> bool {
        matches!(self, Self::Connect | Self::Stomp)
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

/// One STOMP frame
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    command: StompCommand,
    headers: Vec<(String, String)>,
    body: Bytes,
}

// Manual Debug impl to keep bearer tokens out of logs
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let shown = if name == "token" {
                    "[REDACTED]"
                } else {
                    value.as_str()
                };
                (name.as_str(), shown)
            })
            .collect();
        f.debug_struct("Frame")
            .field("command", &self.command)
            .field("headers", &headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl Frame {
    /// Create a frame with no headers and an empty body
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Frame command
    pub fn command(&self) -> StompCommand {
        self.command
    }

    /// All headers in wire order
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Value of the first header named `name`
    pub fn first_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Frame body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode one frame.
    ///
    /// Returns `Ok(None)` when the input holds only heart-beat EOLs.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] when the bytes are not a well-formed STOMP frame.
    pub fn parse(input: &[u8]) -> Result<Option<Self>, FrameError> {
        let mut rest = skip_eols(input);
        if rest.is_empty() {
            return Ok(None);
        }

        let (command_line, after) = split_line(rest).ok_or(FrameError::MissingTerminator)?;
        let command: StompCommand = as_utf8(command_line)?.parse()?;
        rest = after;

        let mut headers = Vec::new();
        loop {
            let (line, after) = split_line(rest).ok_or(FrameError::MissingTerminator)?;
            rest = after;
            if line.is_empty() {
                break;
            }
            let line = as_utf8(line)?;
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(n, _)| n == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body = match content_length {
            Some(len) => {
                if rest.len() <= len || rest[len] != 0 {
                    return Err(FrameError::InvalidContentLength(len.to_string()));
                }
                &rest[..len]
            }
            None => {
                let end = rest
                    .iter()
                    .position(|b| *b == 0)
                    .ok_or(FrameError::MissingTerminator)?;
                &rest[..end]
            }
        };

        Ok(Some(Self {
            command,
            headers,
            body: Bytes::copy_from_slice(body),
        }))
    }

    /// Encode the frame to its wire form, NUL terminator included
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                out.extend_from_slice(escape(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }
}

fn skip_eols(mut input: &[u8]) -> &[u8] {
    loop {
        match input {
            [b'\r', b'\n', rest @ ..] | [b'\n', rest @ ..] => input = rest,
            _ => return input,
        }
    }
}

/// Split off one EOL-terminated line, tolerating `\r\n`
fn split_line(input: &[u8]) -> Option<(&[u8], &[u8])> {
    let newline = input.iter().position(|b| *b == b'\n')?;
    let line = &input[..newline];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    Some((line, &input[newline + 1..]))
}

fn as_utf8(bytes: &[u8]) -> Result<&str, FrameError> {
    std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}
