//! Serial line transport.
//!
//! Frames the raw byte stream into newline-terminated lines. A single line
//! read never waits longer than the read timeout; whatever arrived before the
//! deadline is returned, possibly nothing.

use crate::error::BridgeError;
use log::{debug, info};
use serialport::SerialPort;
use std::io::{self, ErrorKind, Read};
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 256;

/// Where the event loop gets its lines from.
pub trait LineSource {
    /// Non-blocking check for unread input.
    fn has_pending(&mut self) -> Result<bool, BridgeError>;

    /// Reads one line, bounded by the read timeout. The newline is not
    /// included and invalid UTF-8 is dropped.
    fn read_line(&mut self) -> Result<String, BridgeError>;
}

/// A byte stream that can report how many bytes are waiting and whose
/// blocking reads give up after a settable timeout.
pub trait ByteSource: Read {
    fn bytes_to_read(&self) -> io::Result<u32>;

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl ByteSource for Box<dyn SerialPort> {
    fn bytes_to_read(&self) -> io::Result<u32> {
        SerialPort::bytes_to_read(&**self).map_err(io::Error::from)
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        SerialPort::set_timeout(&mut **self, timeout).map_err(io::Error::from)
    }
}

/// Decodes raw bytes, silently dropping invalid UTF-8 sequences.
pub fn decode_line(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

pub struct SerialTransport<P: ByteSource = Box<dyn SerialPort>> {
    port: P,
    name: String,
    read_timeout: Duration,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Opens the port and waits `settle` so the board can finish its reset
    /// before anything is read.
    pub fn open(
        name: &str,
        baud_rate: u32,
        read_timeout: Duration,
        settle: Duration,
    ) -> Result<Self, BridgeError> {
        let port = serialport::new(name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|source| BridgeError::PortOpen {
                port: name.to_string(),
                source,
            })?;
        std::thread::sleep(settle);
        info!("Serial: connected to {} at {} baud", name, baud_rate);
        Ok(Self::with_port(port, name, read_timeout))
    }
}

impl<P: ByteSource> SerialTransport<P> {
    pub fn with_port(port: P, name: &str, read_timeout: Duration) -> Self {
        Self {
            port,
            name: name.to_string(),
            read_timeout,
            pending: Vec::new(),
        }
    }

    /// Moves one complete line out of the pending buffer, if there is one.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        Some(line)
    }

    /// One blocking read, never outlasting `remaining`.
    fn fill(&mut self, remaining: Duration) -> Result<usize, BridgeError> {
        self.port
            .set_timeout(remaining)
            .map_err(BridgeError::SerialRead)?;
        let mut chunk = [0_u8; READ_CHUNK];
        match self.port.read(&mut chunk) {
            Ok(n) => {
                self.pending.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(err) => match err.kind() {
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => Ok(0),
                _ => Err(BridgeError::SerialRead(err)),
            },
        }
    }
}

impl<P: ByteSource> LineSource for SerialTransport<P> {
    fn has_pending(&mut self) -> Result<bool, BridgeError> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        let waiting = self.port.bytes_to_read().map_err(BridgeError::SerialRead)?;
        Ok(waiting > 0)
    }

    fn read_line(&mut self) -> Result<String, BridgeError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            if let Some(line) = self.take_line() {
                return Ok(decode_line(&line));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if self.fill(remaining)? == 0 {
                // Nothing arrived; avoid spinning on sources that return at once
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        // Timed out mid-line: hand back the partial line
        let partial = std::mem::take(&mut self.pending);
        debug!("Serial: read timed out with {} byte(s) buffered", partial.len());
        Ok(decode_line(&partial))
    }
}

impl<P: ByteSource> Drop for SerialTransport<P> {
    fn drop(&mut self) {
        info!("Serial: closed {}", self.name);
    }
}

/// Names of the serial ports the OS reports, with a short description.
pub fn list_ports() -> Result<Vec<String>, serialport::Error> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| match p.port_type {
            serialport::SerialPortType::UsbPort(usb) => format!(
                "{} (USB {:04x}:{:04x}{})",
                p.port_name,
                usb.vid,
                usb.pid,
                usb.product.map(|name| format!(" {}", name)).unwrap_or_default()
            ),
            _ => p.port_name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Serves scripted chunks one read at a time, then times out forever.
    struct ScriptedPort {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ScriptedPort {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                }
                None => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
            }
        }
    }

    impl ByteSource for ScriptedPort {
        fn bytes_to_read(&self) -> io::Result<u32> {
            Ok(self.chunks.iter().map(|c| c.len() as u32).sum())
        }

        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPort;

    impl Read for BrokenPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged"))
        }
    }

    impl ByteSource for BrokenPort {
        fn bytes_to_read(&self) -> io::Result<u32> {
            Ok(1)
        }

        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    /// Behaves like a real driver: a read blocks until the next byte arrives
    /// or the port timeout runs out, whichever comes first.
    struct ClockedPort {
        arrivals: VecDeque<(Instant, Vec<u8>)>,
        timeout: Duration,
    }

    impl ClockedPort {
        fn new(arrivals: &[(Duration, &[u8])], timeout: Duration) -> Self {
            let start = Instant::now();
            Self {
                arrivals: arrivals
                    .iter()
                    .map(|(after, bytes)| (start + *after, bytes.to_vec()))
                    .collect(),
                timeout,
            }
        }
    }

    impl Read for ClockedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let give_up = Instant::now() + self.timeout;
            match self.arrivals.front() {
                Some((at, _)) if *at <= give_up => {
                    std::thread::sleep(at.saturating_duration_since(Instant::now()));
                    let (_, bytes) = self.arrivals.pop_front().unwrap();
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                _ => {
                    std::thread::sleep(self.timeout);
                    Err(io::Error::new(ErrorKind::TimedOut, "timed out"))
                }
            }
        }
    }

    impl ByteSource for ClockedPort {
        fn bytes_to_read(&self) -> io::Result<u32> {
            let now = Instant::now();
            Ok(self
                .arrivals
                .iter()
                .take_while(|(at, _)| *at <= now)
                .map(|(_, b)| b.len() as u32)
                .sum())
        }

        fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.timeout = timeout;
            Ok(())
        }
    }

    fn transport(chunks: &[&[u8]]) -> SerialTransport<ScriptedPort> {
        SerialTransport::with_port(ScriptedPort::new(chunks), "test", Duration::from_millis(50))
    }

    #[test]
    fn test_decode_drops_invalid_bytes() {
        assert_eq!(decode_line(b"ready"), "ready");
        assert_eq!(decode_line(b"re\xffady"), "ready");
        assert_eq!(decode_line(b"\xc3\xa9t\xc3\xa9"), "été");
        assert_eq!(decode_line(b"\xe2\x82"), "");
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut t = transport(&[b"rea", b"dy\r\nHel", b"lo\n"]);
        assert!(t.has_pending().unwrap());
        assert_eq!(t.read_line().unwrap(), "ready\r");
        assert_eq!(t.read_line().unwrap(), "Hello");
        assert!(!t.has_pending().unwrap());
    }

    #[test]
    fn test_several_lines_in_one_chunk() {
        let mut t = transport(&[b"ready\nHello\nWorld\n"]);
        assert_eq!(t.read_line().unwrap(), "ready");
        // The rest is buffered, not lost
        assert!(t.has_pending().unwrap());
        assert_eq!(t.read_line().unwrap(), "Hello");
        assert_eq!(t.read_line().unwrap(), "World");
        assert!(!t.has_pending().unwrap());
    }

    #[test]
    fn test_timeout_returns_partial_then_empty() {
        let mut t = transport(&[b"half a li"]);
        assert_eq!(t.read_line().unwrap(), "half a li");

        let start = Instant::now();
        assert_eq!(t.read_line().unwrap(), "");
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_late_byte_does_not_extend_the_line_timeout() {
        let timeout = Duration::from_millis(200);
        let port = ClockedPort::new(&[(Duration::from_millis(150), &b"a"[..])], timeout);
        let mut t = SerialTransport::with_port(port, "clocked", timeout);

        let start = Instant::now();
        assert_eq!(t.read_line().unwrap(), "a");
        let elapsed = start.elapsed();
        // Without shrinking the port timeout this takes about 350 ms
        assert!(elapsed >= timeout, "returned early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(300), "overran: {:?}", elapsed);
    }

    #[test]
    fn test_empty_lines_are_preserved() {
        let mut t = transport(&[b"\n\nread\n"]);
        assert_eq!(t.read_line().unwrap(), "");
        assert_eq!(t.read_line().unwrap(), "");
        assert_eq!(t.read_line().unwrap(), "read");
    }

    #[test]
    fn test_hard_read_error_is_reported() {
        let mut t = SerialTransport::with_port(BrokenPort, "broken", Duration::from_millis(20));
        match t.read_line() {
            Err(BridgeError::SerialRead(err)) => assert_eq!(err.kind(), ErrorKind::BrokenPipe),
            other => panic!("expected a serial read error, got {:?}", other),
        }
    }
}
