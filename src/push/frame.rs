//! STOMP 1.2 text frame codec.
//!
//! A frame is a command line, `key:value` header lines, a blank line, a body
//! and a terminating NUL octet. Frames travel one per WebSocket text message.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // client -> server
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    // server -> client
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl std::str::FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("malformed header line `{0}`")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header `{0}`")]
    InvalidEscape(String),
    #[error("frame ended before the header block was terminated")]
    UnterminatedHeaders,
    #[error("invalid content-length `{0}`")]
    InvalidContentLength(String),
    #[error("body shorter than content-length: expected {expected}, got {actual}")]
    TruncatedBody { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the first one.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, login: &str) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("login", login)
            .header("heart-beat", "0,0")
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, content_type: &str, body: impl Into<String>) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", content_type)
            .with_body(body)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header("receipt", receipt)
    }

    /// Serialize to wire text, NUL terminated.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (k, v) in &self.headers {
            if escape {
                out.push_str(&escape_header(k));
                out.push(':');
                out.push_str(&escape_header(v));
            } else {
                out.push_str(k);
                out.push(':');
                out.push_str(v);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        // heart-beats and stray EOLs may precede a frame
        let raw = raw.trim_start_matches(['\n', '\r']);
        if raw.is_empty() || raw == "\0" {
            return Err(FrameError::Empty);
        }

        let (head, rest) = split_head(raw)?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

        let command: Command = lines.next().unwrap_or_default().parse()?;
        let escape = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let (k, v) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escape {
                headers.push((unescape_header(k)?, unescape_header(v)?));
            } else {
                headers.push((k.to_string(), v.to_string()));
            }
        }

        let frame = Frame {
            command,
            headers,
            body: String::new(),
        };

        let body = match frame.get("content-length") {
            Some(len) => {
                let expected: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| FrameError::InvalidContentLength(len.to_string()))?;
                if rest.len() < expected || !rest.is_char_boundary(expected) {
                    return Err(FrameError::TruncatedBody {
                        expected,
                        actual: rest.len(),
                    });
                }
                &rest[..expected]
            }
            None => rest.split('\0').next().unwrap_or_default(),
        };

        Ok(Frame {
            body: body.to_string(),
            ..frame
        })
    }
}

/// Split at the blank line ending the header block.
fn split_head(raw: &str) -> Result<(&str, &str), FrameError> {
    // the first EOL that is followed by an empty line, LF or CRLF
    for (pos, _) in raw.match_indices('\n') {
        let rest = &raw[pos + 1..];
        if rest.starts_with('\n') {
            return Ok((&raw[..pos], &raw[pos + 2..]));
        }
        if rest.starts_with("\r\n") {
            return Ok((&raw[..pos], &raw[pos + 3..]));
        }
    }
    // a frame with no headers and no body: "COMMAND\n\n\0" handled above,
    // "COMMAND\n\0" is tolerated here
    match raw.split_once('\0') {
        Some((head, _)) if !head.contains(':') => Ok((head.trim_end_matches(['\n', '\r']), "")),
        _ => Err(FrameError::UnterminatedHeaders),
    }
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}
