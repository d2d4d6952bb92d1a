//! Connection session
//!
//! One physical serial-over-RFCOMM connection to an outlet, with
//! line-oriented send/receive under bounded timeouts and a verbatim
//! traffic trace. Discovery and pairing are the platform's job
//! (`bluetoothctl`, `rfcomm bind`); the session talks to the resulting
//! tty. The transport is a trait so the executor and tests can run
//! against an in-memory implementation.

use std::fs;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::debug;

use super::error::ProtocolError;
use super::frame::TERMINATOR;
use super::{DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};
use crate::device::BdAddr;

/// Poll interval while waiting for reply bytes
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Byte-level transport under a session
pub trait Transport: Send {
    /// Write the whole buffer
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Read waiting bytes into `buf`, returning the count
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes waiting without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// Serial tty transport over the `serialport` crate
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open and configure a tty. The short port timeout keeps reads
    /// non-blocking; the session layer owns the real reply deadline.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, ProtocolError> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| ProtocolError::ConnectionFailed(format!("{path}: {e}")))?;
        Ok(Self { port })
    }

    /// Drop stale bytes left over from an earlier client
    pub fn clear_buffers(&mut self) -> Result<(), ProtocolError> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Explicit tty path; when `None` the lowest-numbered bound
    /// `/dev/rfcomm*` device is used
    pub port: Option<String>,
    /// Baud rate for real serial adapters
    pub baud_rate: u32,
    /// Default reply timeout in milliseconds
    pub reply_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            reply_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Direction of one traced frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Frame written to the device
    Sent,
    /// Reply read from the device
    Received,
}

/// One verbatim traced frame, kept regardless of parsing success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// Which way the frame travelled
    pub direction: Direction,
    /// The frame text, terminator stripped
    pub raw: String,
}

/// One open connection to an outlet
pub struct Session {
    transport: Option<Box<dyn Transport>>,
    trace: Vec<TraceEntry>,
    pending: Vec<u8>,
}

impl Session {
    /// Open a session to the given address. The RFCOMM binding must
    /// already exist; fails with `ConnectionFailed` otherwise.
    pub fn open(address: &BdAddr, config: &SessionConfig) -> Result<Self, ProtocolError> {
        let path = match &config.port {
            Some(path) => path.clone(),
            None => default_rfcomm_tty()?,
        };
        debug!(%address, port = %path, "opening session");
        let mut transport = SerialTransport::open(&path, config.baud_rate)?;
        transport.clear_buffers()?;
        Ok(Self::from_transport(Box::new(transport)))
    }

    /// Wrap an already-open transport
    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
            trace: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Whether the transport is still held
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Write one frame, terminator appended
    pub fn send_line(&mut self, frame: &str) -> Result<(), ProtocolError> {
        let transport = self.transport.as_mut().ok_or(ProtocolError::NotConnected)?;
        debug!("> {frame}");
        self.trace.push(TraceEntry {
            direction: Direction::Sent,
            raw: frame.to_string(),
        });
        let mut wire = frame.as_bytes().to_vec();
        wire.extend_from_slice(TERMINATOR.as_bytes());
        transport
            .write_all(&wire)
            .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))
    }

    /// Wait for one terminated reply, for at most `timeout`
    pub fn receive_line(&mut self, timeout: Duration) -> Result<String, ProtocolError> {
        let transport = self.transport.as_mut().ok_or(ProtocolError::NotConnected)?;
        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; 512];

        loop {
            if let Some(line) = take_line(&mut self.pending) {
                debug!("< {line}");
                self.trace.push(TraceEntry {
                    direction: Direction::Received,
                    raw: line.clone(),
                });
                return Ok(line);
            }

            if Instant::now() >= deadline {
                return Err(ProtocolError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            let available = transport.bytes_to_read()?;
            if available == 0 {
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }
            let want = (available as usize).min(buffer.len());
            match transport.read(&mut buffer[..want]) {
                Ok(n) => self.pending.extend_from_slice(&buffer[..n]),
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    // Raced the driver; poll again
                }
                Err(e) => return Err(ProtocolError::Io(e)),
            }
        }
    }

    /// Release the transport. Idempotent; also runs on drop, so the
    /// connection is released on every exit path.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("session closed");
        }
    }

    /// Every frame sent and received so far, verbatim
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Move the trace out, e.g. after the session is finished
    pub fn take_trace(&mut self) -> Vec<TraceEntry> {
        std::mem::take(&mut self.trace)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Split one CRLF-terminated line off the front of `pending`, stripping
/// the terminator
fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let pos = pending
        .windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR.as_bytes())?;
    let rest = pending.split_off(pos + TERMINATOR.len());
    let mut line = std::mem::replace(pending, rest);
    line.truncate(pos);
    Some(String::from_utf8_lossy(&line).into_owned())
}

/// Locate the lowest-numbered RFCOMM tty bound by the platform
fn default_rfcomm_tty() -> Result<String, ProtocolError> {
    let mut candidates: Vec<(usize, String)> = Vec::new();
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(rest) = name.strip_prefix("rfcomm") {
                    let num = rest.parse::<usize>().unwrap_or(usize::MAX);
                    candidates.push((num, format!("/dev/{name}")));
                }
            }
        }
    }
    candidates.sort();
    candidates
        .into_iter()
        .map(|(_, path)| path)
        .next()
        .ok_or_else(|| {
            ProtocolError::ConnectionFailed(
                "no /dev/rfcomm* tty found; bind one with `rfcomm bind 0 <address> 1`".to_string(),
            )
        })
}
