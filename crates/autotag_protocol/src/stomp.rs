//! STOMP 1.2 frame codec.
//!
//! Frame layout:
//! ```text
//! COMMAND EOL
//! *( header EOL )
//! EOL
//! *OCTET
//! NUL
//! ```
//!
//! EOL is `\n` or `\r\n`. Bare EOLs between frames are heart-beats and are
//! skipped by the decoder. Header values are escaped (`\\`, `\n`, `\r`, `\c`)
//! on every frame except CONNECT and CONNECTED.

use std::fmt;

use crate::defaults::MAX_FRAME_BYTES;
use crate::error::{ProtocolError, Result};

const NUL: u8 = 0;

/// Frame commands used by the intake process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client -> Broker
    Connect,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Send,
    Disconnect,

    // Broker -> Client
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Send => "SEND",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "ACK" => Ok(Command::Ack),
            "NACK" => Ok(Command::Nack),
            "SEND" => Ok(Command::Send),
            "DISCONNECT" => Ok(Command::Disconnect),
            "CONNECTED" => Ok(Command::Connected),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    /// CONNECT and CONNECTED carry raw header values for 1.0 compatibility.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; lookups return the first.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Acknowledge a MESSAGE received on a `client-individual` subscription.
    pub fn ack(ack_id: &str, subscription_id: &str) -> Self {
        Frame::new(Command::Ack)
            .header("id", ack_id)
            .header("subscription", subscription_id)
    }

    /// Serialize to wire bytes, including the trailing NUL.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');

        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        if !self.body.is_empty() {
            out.extend_from_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(NUL);
        out
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Consumed bytes are drained from `buf`. Returns `Ok(None)` when the
    /// buffer holds only heart-beats or an incomplete frame.
    pub fn decode(buf: &mut Vec<u8>) -> Result<Option<Frame>> {
        let leading = buf
            .iter()
            .position(|b| *b != b'\n' && *b != b'\r')
            .unwrap_or(buf.len());
        if leading > 0 {
            buf.drain(..leading);
        }
        if buf.is_empty() {
            return Ok(None);
        }

        let Some((head_end, body_start)) = find_header_end(buf) else {
            return incomplete(buf);
        };

        let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| ProtocolError::InvalidUtf8)?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command = Command::parse(lines.next().unwrap_or_default())?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| ProtocolError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let (body_end, frame_end) = match content_length {
            Some(len) => {
                let body_end = body_start
                    .checked_add(len)
                    .filter(|end| *end < MAX_FRAME_BYTES)
                    .ok_or_else(|| ProtocolError::InvalidContentLength(len.to_string()))?;
                if buf.len() <= body_end {
                    return Ok(None);
                }
                if buf[body_end] != NUL {
                    return Err(ProtocolError::MissingNul);
                }
                (body_end, body_end + 1)
            }
            None => match buf[body_start..].iter().position(|b| *b == NUL) {
                Some(offset) => (body_start + offset, body_start + offset + 1),
                None => return incomplete(buf),
            },
        };

        let body = buf[body_start..body_end].to_vec();
        buf.drain(..frame_end);

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

/// A partial frame may keep buffering only while it fits the frame limit.
fn incomplete(buf: &[u8]) -> Result<Option<Frame>> {
    if buf.len() >= MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            limit: MAX_FRAME_BYTES,
        });
    }
    Ok(None)
}

/// Locate the blank line ending the header block.
///
/// Returns `(end of header text, start of body)`.
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match (buf.get(i + 1), buf.get(i + 2)) {
                (Some(b'\n'), _) => return Some((i, i + 2)),
                (Some(b'\r'), Some(b'\n')) => return Some((i, i + 3)),
                (None, _) | (Some(b'\r'), None) => return None,
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}
