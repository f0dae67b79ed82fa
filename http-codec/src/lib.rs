//! HTTP-style message codec
//!
//! SSDP datagrams and WebSocket upgrade handshakes share the HTTP/1.1
//! message head: a start line, `Name: value` header lines and a blank
//! line. This crate parses and writes that head.
//!
//! ```rust
//! use http_codec::HttpMessage;
//!
//! let msg = HttpMessage::parse(
//!     b"NOTIFY * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nNTS: ssdp:alive\r\n\r\n",
//! )
//! .unwrap();
//!
//! assert_eq!(msg.method(), Some("NOTIFY"));
//! assert_eq!(msg.headers.get("nts"), Some("ssdp:alive"));
//! ```

mod error;
mod headers;

pub use error::CodecError;
pub use headers::Headers;

/// First line of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: String,
        target: String,
        version: String,
    },
    Response {
        version: String,
        status: u16,
        reason: String,
    },
}

impl StartLine {
    fn parse(line: &str) -> Result<Self, CodecError> {
        let mut parts = line.trim().splitn(3, ' ');
        let first = parts.next().unwrap_or_default();
        let second = parts.next().unwrap_or_default();
        let third = parts.next().unwrap_or_default().trim();

        if first.is_empty() || second.is_empty() {
            return Err(CodecError::InvalidStartLine(line.to_string()));
        }

        if first.starts_with("HTTP/") {
            let status = second
                .parse::<u16>()
                .map_err(|_| CodecError::InvalidStatus(second.to_string()))?;
            Ok(StartLine::Response {
                version: first.to_string(),
                status,
                reason: third.to_string(),
            })
        } else if third.starts_with("HTTP/") {
            Ok(StartLine::Request {
                method: first.to_string(),
                target: second.to_string(),
                version: third.to_string(),
            })
        } else {
            Err(CodecError::InvalidStartLine(line.to_string()))
        }
    }
}

impl std::fmt::Display for StartLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartLine::Request {
                method,
                target,
                version,
            } => write!(f, "{} {} {}", method, target, version),
            StartLine::Response {
                version,
                status,
                reason,
            } => write!(f, "{} {} {}", version, status, reason),
        }
    }
}

/// A parsed or to-be-written message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMessage {
    pub start: StartLine,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpMessage {
    /// `METHOD target HTTP/1.1`
    pub fn request(method: &str, target: &str) -> Self {
        Self {
            start: StartLine::Request {
                method: method.to_string(),
                target: target.to_string(),
                version: "HTTP/1.1".to_string(),
            },
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// `HTTP/1.1 status reason`
    pub fn response(status: u16, reason: &str) -> Self {
        Self {
            start: StartLine::Response {
                version: "HTTP/1.1".to_string(),
                status,
                reason: reason.to_string(),
            },
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Append a header, builder style
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse one complete message (a datagram)
    ///
    /// Lines may end in CRLF or LF. Everything after the blank line is
    /// the body.
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        let (head_len, body_start) = match find_head_end(data) {
            Some(end) => end,
            None => (data.len(), data.len()),
        };
        let mut msg = Self::parse_head_bytes(&data[..head_len])?;
        msg.body = data[body_start..].to_vec();
        Ok(msg)
    }

    /// Parse the head of a message at the start of a stream buffer
    ///
    /// Returns `Ok(None)` while the blank line has not arrived yet,
    /// otherwise the message (without body) and the number of bytes
    /// consumed.
    pub fn parse_head(buf: &[u8]) -> Result<Option<(Self, usize)>, CodecError> {
        match find_head_end(buf) {
            Some((head_len, consumed)) => {
                let msg = Self::parse_head_bytes(&buf[..head_len])?;
                Ok(Some((msg, consumed)))
            }
            None => Ok(None),
        }
    }

    fn parse_head_bytes(head: &[u8]) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(head).map_err(|_| CodecError::InvalidUtf8)?;
        let mut lines = text.lines();

        let start_line = lines
            .by_ref()
            .find(|l| !l.trim().is_empty())
            .ok_or(CodecError::EmptyMessage)?;
        let start = StartLine::parse(start_line)?;

        let mut headers = Headers::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| CodecError::InvalidHeader(line.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(CodecError::InvalidHeader(line.to_string()));
            }
            headers.append(name, value.trim());
        }

        Ok(Self {
            start,
            headers,
            body: Vec::new(),
        })
    }

    /// Serialize with CRLF line endings and the terminating blank line
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&self.start.to_string());
        out.push_str("\r\n");
        for (name, value) in self.headers.iter() {
            out.push_str(name);
            out.push(':');
            if !value.is_empty() {
                out.push(' ');
                out.push_str(value);
            }
            out.push_str("\r\n");
        }
        out.push_str("\r\n");

        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    pub fn method(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { target, .. } => Some(target),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.start {
            StartLine::Response { status, .. } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// Returns (head length, bytes consumed including the blank line)
fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            if buf.get(i + 1) == Some(&b'\n') {
                return Some((i + 1, i + 2));
            }
            if buf.get(i + 1) == Some(&b'\r') && buf.get(i + 2) == Some(&b'\n') {
                return Some((i + 1, i + 3));
            }
        }
        i += 1;
    }
    None
}

/// Extract `N` from a `Cache-Control` value containing `max-age=N`
pub fn max_age(cache_control: &str) -> Option<i64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse::<i64>().ok()
        } else {
            None
        }
    })
}
