//! Byte links the CLI can run transfers over.
//!
//! Both link flavors implement [`ymodem::Transport`]: a serial port via
//! the `serialport` crate (the usual physical setup) and a TCP stream for
//! bench testing without wiring.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use anyhow::{Context as _, Result};
use ymodem::Transport;

/// A serial port speaking 8N1 at the requested baud rate.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink {
    /// Opens `dev` (e.g. `/dev/ttyUSB0`) at `baud`.
    pub fn open(dev: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(dev, baud)
            .timeout(Duration::from_millis(100))
            .open()
            .with_context(|| format!("failed to open serial port {dev}"))?;
        info!("opened {dev} at {baud} baud");
        Ok(Self { port })
    }
}

impl Transport for SerialLink {
    fn send(&mut self, data: &[u8]) -> usize {
        match self.port.write_all(data).and_then(|_| self.port.flush()) {
            Ok(()) => data.len(),
            Err(e) => {
                warn!("serial write failed: {e}");
                0
            }
        }
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        if let Err(e) = self.port.set_timeout(timeout) {
            warn!("serial set_timeout failed: {e}");
            return 0;
        }
        match self.port.read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => 0,
            Err(e) => {
                warn!("serial read failed: {e}");
                0
            }
        }
    }
}

/// A connected TCP stream.
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    /// Connects to a listening peer.
    pub fn connect(addr: &str) -> Result<Self> {
        let stream =
            TcpStream::connect(addr).with_context(|| format!("failed to connect to {addr}"))?;
        stream.set_nodelay(true).ok();
        info!("connected to {addr}");
        Ok(Self { stream })
    }

    /// Binds `addr` and waits for the first connection.
    pub fn listen(addr: &str) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).with_context(|| format!("failed to bind {addr}"))?;
        info!("listening on {addr}");
        let (stream, peer) = listener.accept().context("accept failed")?;
        stream.set_nodelay(true).ok();
        info!("peer connected from {peer}");
        Ok(Self { stream })
    }
}

impl Transport for TcpLink {
    fn send(&mut self, data: &[u8]) -> usize {
        match self.stream.write_all(data).and_then(|_| self.stream.flush()) {
            Ok(()) => data.len(),
            Err(e) => {
                warn!("tcp write failed: {e}");
                0
            }
        }
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        if self.stream.set_read_timeout(Some(timeout)).is_err() {
            return 0;
        }
        match self.stream.read(buf) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => 0,
            Err(e) => {
                warn!("tcp read failed: {e}");
                0
            }
        }
    }
}

/// Whichever link the command line asked for.
pub enum Link {
    Serial(SerialLink),
    Tcp(TcpLink),
}

impl Transport for Link {
    fn send(&mut self, data: &[u8]) -> usize {
        match self {
            Link::Serial(l) => l.send(data),
            Link::Tcp(l) => l.send(data),
        }
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        match self {
            Link::Serial(l) => l.receive(buf, timeout),
            Link::Tcp(l) => l.receive(buf, timeout),
        }
    }
}
