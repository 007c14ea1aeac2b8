//! Receiver side of the protocol.
//!
//! The receiver drives the session: it solicits CRC mode with 'C', parses
//! the packet-0 announcement, ACKs data packets as they validate, and
//! walks the tolerant two-EOT / batch-terminator close that common field
//! senders expect.

use crate::config::Config;
use crate::context::{Context, Stage};
use crate::error::{Error, Result};
use crate::files::FileIo;
use crate::frame::{self, ACK, CRC, EOT, FileInfo, NAK, PREFIX_LEN, SOH, STX, TRAILER_LEN};
use crate::transport::Transport;

/// YMODEM receiver over a transport and a file sink.
///
/// Reusable across transfers, like [`Sender`](crate::Sender).
pub struct Receiver<T: Transport, F: FileIo> {
    ctx: Context<T, F>,
}

impl<T: Transport, F: FileIo> Receiver<T, F> {
    /// Creates a receiver from its capabilities and configuration.
    pub fn new(transport: T, files: F, config: Config) -> Self {
        Self { ctx: Context::new(transport, files, config) }
    }

    /// Current transfer stage.
    pub fn stage(&self) -> Stage {
        self.ctx.stage()
    }

    /// Closes any open file and resets the stage. Idempotent.
    pub fn cleanup(&mut self) {
        self.ctx.cleanup();
    }

    /// Sends a CAN burst and resets the session.
    pub fn abort(&mut self) {
        self.ctx.abort();
    }

    /// Receives one file.
    ///
    /// `handshake_timeout_s` bounds how many 'C' solicitations go out
    /// before giving up. Returns the announced file info, or `Ok(None)`
    /// when the sender opened the session with a batch terminator (it had
    /// nothing to send). The output file handle is released on every exit
    /// path.
    pub fn recv_file(&mut self, handshake_timeout_s: u32) -> Result<Option<FileInfo>> {
        let res = self.run(handshake_timeout_s);
        self.ctx.close_file();
        match &res {
            Ok(Some(info)) => info!("received {:?} ({} bytes)", info.filename, info.size),
            Ok(None) => info!("peer had nothing to send"),
            Err(e) => warn!("receive failed: {e:?}"),
        }
        res
    }

    fn run(&mut self, handshake_timeout_s: u32) -> Result<Option<FileInfo>> {
        let ctx = &mut self.ctx;

        let Some(info) = Self::handshake(ctx, handshake_timeout_s)? else {
            return Ok(None);
        };
        Self::transmit(ctx)?;
        Self::finish(ctx)?;
        Ok(Some(info))
    }

    /// Solicits the transfer with 'C' and consumes packet 0.
    fn handshake(ctx: &mut Context<T, F>, timeout_s: u32) -> Result<Option<FileInfo>> {
        ctx.stage = Stage::Establishing;

        let mut header = None;
        for _ in 0..timeout_s {
            if !ctx.send_byte(CRC) {
                return Err(Error::WrongCode);
            }
            match ctx.recv_byte(ctx.config.handshake_interval_ms) {
                Ok(b @ (SOH | STX)) => {
                    header = Some(b);
                    break;
                }
                Ok(_) | Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
        }
        let Some(header) = header else {
            return Err(Error::Timeout);
        };
        debug!("sender answered with {header:#04X}");

        // No retry for a corrupt packet 0: the sender will not resend it
        // on NAK, so a failure here ends the session.
        let (seq, data_len) = Self::read_packet_body(ctx, header)?;
        if seq != 0 {
            return Err(Error::WrongSequence);
        }

        let payload = &ctx.frame[PREFIX_LEN..PREFIX_LEN + data_len];
        let Some(info) = frame::decode_file_info(payload)? else {
            // Batch terminator as the very first packet: the sender has
            // nothing for us. Acknowledge and end the session cleanly.
            if !ctx.send_byte(ACK) {
                return Err(Error::WrongCode);
            }
            ctx.stage = Stage::Finished;
            return Ok(None);
        };

        ctx.set_filename(&info.filename);
        ctx.file_size = info.size;
        ctx.stage = Stage::Established;
        debug!("announced file {:?}, {} bytes", info.filename, info.size);

        let name = ctx.filename.clone();
        ctx.open_file(&name, true)?;

        if !ctx.send_byte(ACK) || !ctx.send_byte(CRC) {
            return Err(Error::WrongCode);
        }

        Ok(Some(info))
    }

    /// Reads and validates the body of a packet whose header byte is
    /// already known. Returns the sequence number and data length.
    fn read_packet_body(ctx: &mut Context<T, F>, header: u8) -> Result<(u8, usize)> {
        let data_len = frame::data_len(header).ok_or(Error::WrongCode)?;
        let total = PREFIX_LEN + data_len + TRAILER_LEN;

        ctx.frame[0] = header;
        ctx.recv_into_frame(1, total - 1, ctx.config.wait_packet_timeout_ms)?;

        let (seq, _) = frame::check(&ctx.frame[..total])?;
        Ok((seq, data_len))
    }

    /// Consumes data packets until the first EOT.
    fn transmit(ctx: &mut Context<T, F>) -> Result<()> {
        ctx.stage = Stage::Transmitting;

        let mut expected: u8 = 1;
        let mut written: u64 = 0;
        let mut errors: u32 = 0;

        loop {
            let header = ctx.recv_byte(ctx.config.wait_packet_timeout_ms)?;

            if header == EOT {
                return Ok(());
            }

            if header != SOH && header != STX {
                errors += 1;
                debug!("unexpected byte {header:#04X} in data phase ({errors} errors)");
                if errors >= ctx.config.max_errors {
                    return Err(Error::WrongCode);
                }
                if !ctx.send_byte(NAK) {
                    return Err(Error::WrongCode);
                }
                continue;
            }

            let (seq, data_len) = match Self::read_packet_body(ctx, header) {
                Ok(parts) => parts,
                Err(e) => {
                    errors += 1;
                    debug!("bad packet: {e:?} ({errors} errors)");
                    if errors >= ctx.config.max_errors {
                        return Err(e);
                    }
                    if !ctx.send_byte(NAK) {
                        return Err(Error::WrongCode);
                    }
                    continue;
                }
            };

            if seq == expected.wrapping_sub(1) {
                // Retransmission of a block we already stored; its ACK
                // was lost. Re-ACK without writing.
                debug!("duplicate packet {seq}, re-ACKing");
                if !ctx.send_byte(ACK) {
                    return Err(Error::WrongCode);
                }
                continue;
            }

            if seq != expected {
                errors += 1;
                debug!("out of sequence: got {seq}, expected {expected} ({errors} errors)");
                if errors >= ctx.config.max_errors {
                    return Err(Error::WrongSequence);
                }
                if !ctx.send_byte(NAK) {
                    return Err(Error::WrongCode);
                }
                continue;
            }

            errors = 0;

            // Trim EOF padding off the final block when the announced
            // size says where the file really ends.
            let to_write = if ctx.file_size > 0 {
                (data_len as u64).min(ctx.file_size.saturating_sub(written)) as usize
            } else {
                data_len
            };
            if to_write > 0 {
                ctx.write_from_frame(to_write)?;
                written += to_write as u64;
            }

            if !ctx.send_byte(ACK) {
                return Err(Error::WrongCode);
            }
            expected = expected.wrapping_add(1);
        }
    }

    /// Tolerant close: second EOT, then the batch terminator.
    fn finish(ctx: &mut Context<T, F>) -> Result<()> {
        ctx.stage = Stage::Finishing;

        // First EOT already consumed; NAK it to ask for confirmation.
        if !ctx.send_byte(NAK) {
            return Err(Error::WrongCode);
        }
        let confirmed = match ctx.recv_byte(ctx.config.wait_packet_timeout_ms) {
            Ok(EOT) => true,
            _ => {
                // One more chance.
                if !ctx.send_byte(NAK) {
                    return Err(Error::WrongCode);
                }
                matches!(ctx.recv_byte(ctx.config.wait_packet_timeout_ms), Ok(EOT))
            }
        };
        if !confirmed {
            return Err(Error::WrongCode);
        }

        if !ctx.send_byte(ACK) || !ctx.send_byte(CRC) {
            return Err(Error::WrongCode);
        }

        let mut retries = 0;
        while retries < ctx.config.max_errors {
            match ctx.recv_byte(ctx.config.wait_packet_timeout_ms) {
                Ok(header @ (SOH | STX)) => match Self::read_packet_body(ctx, header) {
                    Ok((0, _)) => {
                        if ctx.frame[PREFIX_LEN] != 0 {
                            // Start of another file; this core handles a
                            // single file, so acknowledge and stop here.
                            debug!("further batch entry ignored");
                        }
                        if !ctx.send_byte(ACK) {
                            return Err(Error::WrongCode);
                        }
                        ctx.stage = Stage::Finished;
                        return Ok(());
                    }
                    Ok(_) | Err(_) => retries += 1,
                },
                Ok(EOT) => {
                    // A straggling EOT; acknowledge it again.
                    if !ctx.send_byte(ACK) {
                        return Err(Error::WrongCode);
                    }
                    retries += 1;
                }
                Ok(_) | Err(Error::Timeout) => retries += 1,
                Err(e) => return Err(e),
            }
        }

        // The file is written and closed out; a sender that walked away
        // without the terminator exchange does not undo that.
        debug!("no terminator packet after {retries} tries, finishing anyway");
        ctx.stage = Stage::Finished;
        Ok(())
    }
}
