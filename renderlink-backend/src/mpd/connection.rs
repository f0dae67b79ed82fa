//! Line protocol of the MPD control socket

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{BackendError, Result};

/// Line-oriented access to an MPD server
pub trait MpdConnection: Send {
    /// Send one command line; the newline is appended
    fn send_line(&mut self, line: &str) -> Result<()>;

    /// Read one response line without its newline
    ///
    /// Returns `Disconnected` at end of stream.
    fn read_line(&mut self) -> Result<String>;
}

/// MPD connection over TCP
pub struct TcpMpdConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpMpdConnection {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| BackendError::Protocol(format!("cannot resolve {}", host)))?;

        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }
}

impl MpdConnection for TcpMpdConnection {
    fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(BackendError::Disconnected);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(line)
    }
}

/// Outcome of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MpdReply {
    /// Response lines preceding `OK`
    Ok(Vec<String>),
    /// The `ACK` line; the command had no effect
    Ack(String),
}

impl MpdReply {
    /// Response lines, empty for an `ACK`
    pub fn lines(&self) -> &[String] {
        match self {
            MpdReply::Ok(lines) => lines,
            MpdReply::Ack(_) => &[],
        }
    }

    /// Value of the first `key: value` line with this key
    pub fn value(&self, key: &str) -> Option<&str> {
        self.lines().iter().find_map(|line| match split_pair(line) {
            Some((k, v)) if k == key => Some(v),
            _ => None,
        })
    }
}

/// Split a `key: value` response line
pub fn split_pair(line: &str) -> Option<(&str, &str)> {
    line.split_once(": ")
}

/// Send a command and collect its response
pub fn execute<C: MpdConnection + ?Sized>(conn: &mut C, command: &str) -> Result<MpdReply> {
    tracing::debug!("mpd > {}", command);
    conn.send_line(command)?;

    let mut lines = Vec::new();
    loop {
        let line = conn.read_line()?;
        if line == "OK" {
            return Ok(MpdReply::Ok(lines));
        }
        if line.starts_with("ACK") {
            tracing::warn!("mpd rejected '{}': {}", command, line);
            return Ok(MpdReply::Ack(line));
        }
        lines.push(line);
    }
}

/// Read the `OK MPD <version>` greeting; returns the version
pub fn read_greeting<C: MpdConnection + ?Sized>(conn: &mut C) -> Result<String> {
    let line = conn.read_line()?;
    line.strip_prefix("OK MPD ")
        .map(str::to_string)
        .ok_or_else(|| BackendError::Protocol(format!("unexpected greeting: {}", line)))
}

/// Quote an argument for the command line
pub fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
