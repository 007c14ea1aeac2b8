//! Byte transport abstraction.
//!
//! The protocol core is transport agnostic: anything that can push bytes
//! out and pull bytes in with a deadline will do (UART, TCP socket, an
//! in-memory pipe in tests). Implementations live with the caller; the
//! [`Context`](crate::context::Context) is the only code in this crate
//! that calls these methods.

use std::time::Duration;

/// A bidirectional byte stream with timeout-bounded reads.
pub trait Transport {
    /// Writes `data`, returning how many bytes were accepted. Anything
    /// short of `data.len()` is treated as a failed send by the protocol.
    fn send(&mut self, data: &[u8]) -> usize;

    /// Reads up to `buf.len()` bytes, blocking at most `timeout`.
    ///
    /// Returns the number of bytes delivered; 0 means the timeout elapsed
    /// (or the stream is dead, which the protocol treats the same way).
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> usize;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, data: &[u8]) -> usize {
        (**self).send(data)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        (**self).receive(buf, timeout)
    }
}

/// Scripted transport for state machine tests: reads come from a queue
/// (with explicit timeout markers), writes are logged for inspection.
#[cfg(test)]
pub(crate) struct ScriptTransport {
    reads: std::collections::VecDeque<Option<u8>>,
    pub writes: Vec<u8>,
}

#[cfg(test)]
impl ScriptTransport {
    pub fn new() -> Self {
        Self { reads: std::collections::VecDeque::new(), writes: Vec::new() }
    }

    /// Queues bytes to be delivered on subsequent reads.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.reads.extend(bytes.iter().copied().map(Some));
    }

    /// Queues one read that times out.
    pub fn push_timeout(&mut self) {
        self.reads.push_back(None);
    }
}

#[cfg(test)]
impl Transport for ScriptTransport {
    fn send(&mut self, data: &[u8]) -> usize {
        self.writes.extend_from_slice(data);
        data.len()
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.reads.front() {
                Some(Some(_)) => {
                    buf[n] = self.reads.pop_front().unwrap().unwrap();
                    n += 1;
                }
                Some(None) => {
                    // A queued timeout ends this read; consume the marker
                    // only when it would otherwise be the whole read.
                    if n == 0 {
                        self.reads.pop_front();
                    }
                    break;
                }
                None => break,
            }
        }
        n
    }
}
