//! Transfer context: stage, buffers, counters, and the link adapter.
//!
//! One [`Context`] backs one transfer at a time. It owns the transport and
//! file capabilities, a frame buffer large enough for the biggest packet
//! and a staging buffer for file blocks, and it is the single place where
//! raw bytes cross the transport (and get traced).

use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::files::FileIo;
use crate::frame::{CAN, MAX_FILENAME_LEN, MAX_PACKET_LEN, PREFIX_LEN, STX_DATA_LEN};
use crate::transport::Transport;

/// How many `FileIo::read` calls may be combined to fill one block.
const READ_FILL_ATTEMPTS: usize = 10;

/// Where a transfer currently stands.
///
/// Advances monotonically during a successful transfer; a failed transfer
/// leaves the stage at the point of failure until `cleanup` resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Stage {
    /// Nothing in flight (initial state, and after `cleanup`).
    #[default]
    Idle,
    /// Handshake in progress.
    Establishing,
    /// Packet 0 exchanged, data may flow.
    Established,
    /// Data packets moving.
    Transmitting,
    /// EOT / batch terminator exchange in progress.
    Finishing,
    /// Transfer complete.
    Finished,
}

/// Shared state for one side of a transfer.
pub struct Context<T: Transport, F: FileIo> {
    transport: T,
    files: F,
    pub(crate) config: Config,
    pub(crate) stage: Stage,
    /// Whole-packet assembly/validation area.
    pub(crate) frame: [u8; MAX_PACKET_LEN],
    /// Staging area for file block fills on the sending side.
    pub(crate) block: [u8; STX_DATA_LEN],
    pub(crate) handle: Option<F::Handle>,
    pub(crate) filename: String,
    pub(crate) file_size: u64,
}

impl<T: Transport, F: FileIo> Context<T, F> {
    pub(crate) fn new(transport: T, files: F, config: Config) -> Self {
        Self {
            transport,
            files,
            config,
            stage: Stage::Idle,
            frame: [0; MAX_PACKET_LEN],
            block: [0; STX_DATA_LEN],
            handle: None,
            filename: String::new(),
            file_size: 0,
        }
    }

    /// Current transfer stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Name of the file in flight, once known.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Closes the file handle if one is open and resets the stage.
    ///
    /// Idempotent; safe to call after success, failure, or not at all.
    pub fn cleanup(&mut self) {
        self.close_file();
        self.stage = Stage::Idle;
    }

    /// Aborts the session: emits a burst of CAN bytes, closes the file,
    /// and resets the stage. The state machines never call this on their
    /// own; it is an operator-level escape hatch.
    pub fn abort(&mut self) {
        debug!("aborting, sending {} CAN bytes", self.config.can_send_count);
        for _ in 0..self.config.can_send_count {
            if !self.send_byte(CAN) {
                break;
            }
        }
        self.cleanup();
    }

    // ---- link adapter ------------------------------------------------

    pub(crate) fn send_byte(&mut self, byte: u8) -> bool {
        let ok = self.transport.send(&[byte]) == 1;
        trace!("tx {byte:#04X} ok={ok}");
        ok
    }

    /// Sends `self.frame[..len]` as one transport write.
    pub(crate) fn send_frame(&mut self, len: usize) -> Result<()> {
        let sent = self.transport.send(&self.frame[..len]);
        trace!("tx frame {:02X?}... ({sent}/{len})", &self.frame[..len.min(8)]);
        if sent == len { Ok(()) } else { Err(Error::WrongCode) }
    }

    /// Receives one byte, mapping an empty read to [`Error::Timeout`].
    pub(crate) fn recv_byte(&mut self, timeout_ms: u32) -> Result<u8> {
        let mut byte = [0u8; 1];
        let n = self
            .transport
            .receive(&mut byte, Duration::from_millis(timeout_ms as u64));
        if n == 0 {
            trace!("rx timeout ({timeout_ms} ms)");
            return Err(Error::Timeout);
        }
        trace!("rx {:#04X}", byte[0]);
        Ok(byte[0])
    }

    /// Fills `self.frame[offset..offset + len]`, tolerating partial reads.
    pub(crate) fn recv_into_frame(&mut self, offset: usize, len: usize, timeout_ms: u32) -> Result<()> {
        let timeout = Duration::from_millis(timeout_ms as u64);
        let mut got = 0;
        while got < len {
            let n = self
                .transport
                .receive(&mut self.frame[offset + got..offset + len], timeout);
            if n == 0 {
                trace!("rx frame body timeout after {got}/{len} bytes");
                return Err(Error::Timeout);
            }
            got += n;
        }
        trace!("rx frame body {len} bytes");
        Ok(())
    }

    // ---- file adapter ------------------------------------------------

    /// Opens `name` and takes ownership of the handle.
    pub(crate) fn open_file(&mut self, name: &str, writing: bool) -> Result<()> {
        match self.files.open(name, writing) {
            Some(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            None => Err(Error::FileError),
        }
    }

    pub(crate) fn close_file(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.files.close(handle);
        }
    }

    /// Total size of the open file, queried once at open time.
    pub(crate) fn query_file_size(&mut self) -> Result<u64> {
        let handle = self.handle.as_mut().ok_or(Error::FileError)?;
        self.files.size(handle).ok_or(Error::FileError)
    }

    /// Fills the block buffer from the open file, combining up to
    /// [`READ_FILL_ATTEMPTS`] short reads. Returns the number of bytes
    /// staged; 0 means end of file.
    pub(crate) fn fill_block(&mut self) -> Result<usize> {
        let handle = self.handle.as_mut().ok_or(Error::FileError)?;
        let mut fill = 0;
        for _ in 0..READ_FILL_ATTEMPTS {
            let n = self.files.read(handle, &mut self.block[fill..]);
            if n == 0 {
                break;
            }
            fill += n;
            if fill == self.block.len() {
                break;
            }
        }
        Ok(fill)
    }

    /// Writes the first `len` payload bytes of the frame buffer to the
    /// open file. A short write is a failure.
    pub(crate) fn write_from_frame(&mut self, len: usize) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(Error::FileError)?;
        let written = self
            .files
            .write(handle, &self.frame[PREFIX_LEN..PREFIX_LEN + len]);
        if written == len { Ok(()) } else { Err(Error::FileError) }
    }

    /// Simultaneous access to the block staging buffer and the frame
    /// buffer, for framing a staged block in place.
    pub(crate) fn block_and_frame(&mut self) -> (&[u8; STX_DATA_LEN], &mut [u8; MAX_PACKET_LEN]) {
        (&self.block, &mut self.frame)
    }

    /// Records the name of the file in flight, truncated to the protocol
    /// limit.
    pub(crate) fn set_filename(&mut self, name: &str) {
        let mut end = name.len().min(MAX_FILENAME_LEN - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.filename.clear();
        self.filename.push_str(&name[..end]);
    }
}

#[cfg(test)]
impl Context<crate::transport::ScriptTransport, crate::files::MemFs> {
    /// Everything the state machine wrote to the wire, in order.
    pub(crate) fn transport_writes(&self) -> &[u8] {
        &self.transport.writes
    }

    /// Outstanding file handles in the in-memory store.
    pub(crate) fn open_handle_count(&self) -> usize {
        self.files.open_handles
    }

    /// The in-memory store itself.
    pub(crate) fn mem_fs(&self) -> &crate::files::MemFs {
        &self.files
    }
}
