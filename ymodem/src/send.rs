//! Sender side of the protocol.
//!
//! A transfer walks the classic YMODEM stations: wait for the receiver's
//! 'C', announce the file in packet 0, stream SOH/STX data packets under a
//! stop-and-wait ACK regime, then close the session with two EOTs and the
//! all-zero batch terminator.

use std::path::Path;

use crate::config::Config;
use crate::context::{Context, Stage};
use crate::error::{Error, Result};
use crate::files::FileIo;
use crate::frame::{self, ACK, CAN, CRC, EOF, EOT, NAK, SOH, SOH_DATA_LEN, STX, STX_DATA_LEN};
use crate::transport::Transport;

/// YMODEM sender over a transport and a file source.
///
/// Reusable: after a transfer completes (or fails and [`cleanup`] ran) the
/// same instance can send another file.
///
/// [`cleanup`]: Sender::cleanup
pub struct Sender<T: Transport, F: FileIo> {
    ctx: Context<T, F>,
}

impl<T: Transport, F: FileIo> Sender<T, F> {
    /// Creates a sender from its capabilities and configuration.
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

    /// Sends one file.
    ///
    /// `handshake_timeout_s` bounds how long to wait for the receiver's
    /// first 'C'. `on_progress` is called with (bytes acknowledged, total
    /// bytes) after every acknowledged data packet.
    ///
    /// On success the stage is [`Stage::Finished`]; on failure the stage
    /// is left at the point of failure for inspection. The file handle is
    /// released on every exit path.
    pub fn send_file(
        &mut self,
        path: &str,
        handshake_timeout_s: u32,
        on_progress: impl Fn(u64, u64),
    ) -> Result<()> {
        let res = self.run(path, handshake_timeout_s, on_progress);
        self.ctx.close_file();
        if res.is_ok() {
            info!("sent {:?} ({} bytes)", self.ctx.filename, self.ctx.file_size);
        } else {
            warn!("send of {path:?} failed: {res:?}");
        }
        res
    }

    fn run(
        &mut self,
        path: &str,
        handshake_timeout_s: u32,
        on_progress: impl Fn(u64, u64),
    ) -> Result<()> {
        let ctx = &mut self.ctx;

        let basename = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);
        ctx.set_filename(basename);

        ctx.open_file(path, false)?;
        ctx.file_size = ctx.query_file_size()?;
        info!("sending {basename:?}, {} bytes", ctx.file_size);

        // Validate the announcement before anything hits the wire, so an
        // oversized name fails with a silent link.
        let mut info_payload = [0u8; SOH_DATA_LEN];
        frame::encode_file_info(&ctx.filename, ctx.file_size, &mut info_payload)?;

        Self::handshake(ctx, handshake_timeout_s, &info_payload)?;
        Self::transmit(ctx, on_progress)?;
        Self::finish(ctx)
    }

    /// Waits for 'C', sends packet 0, and waits for the ACK + 'C' pair.
    fn handshake(ctx: &mut Context<T, F>, timeout_s: u32, info_payload: &[u8]) -> Result<()> {
        ctx.stage = Stage::Establishing;

        let mut started = false;
        for _ in 0..timeout_s {
            match ctx.recv_byte(ctx.config.handshake_interval_ms) {
                Ok(CRC) => {
                    started = true;
                    break;
                }
                Ok(CAN) => return Err(Error::Cancelled),
                Ok(_) | Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
        }
        if !started {
            return Err(Error::Timeout);
        }
        debug!("receiver requested CRC mode");

        let len = frame::build(SOH, 0, info_payload, &mut ctx.frame)?;
        ctx.send_frame(len)?;

        // The canonical reply is ACK then 'C', but either order happens in
        // the field, and a lone 'C' means the ACK was lost on the way.
        let mut acked = false;
        for _ in 0..ctx.config.max_errors {
            match ctx.recv_byte(ctx.config.wait_packet_timeout_ms) {
                Ok(ACK) => acked = true,
                Ok(CRC) => {
                    ctx.stage = Stage::Established;
                    debug!("file info acknowledged (ack seen: {acked})");
                    return Ok(());
                }
                Ok(CAN) => return Err(Error::Cancelled),
                Ok(_) | Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
        }
        Err(Error::AckError)
    }

    /// Streams the file as SOH/STX packets, one ACK at a time.
    fn transmit(ctx: &mut Context<T, F>, on_progress: impl Fn(u64, u64)) -> Result<()> {
        ctx.stage = Stage::Transmitting;

        let mut seq: u8 = 1;
        let mut sent: u64 = 0;
        let mut first_packet = true;

        loop {
            let fill = ctx.fill_block()?;
            if fill == 0 {
                break;
            }
            let last = fill < STX_DATA_LEN;

            // A short final block goes out as SOH when it fits, otherwise
            // as a full STX block padded up; short STX payloads never hit
            // the wire.
            let (header, data_len) = if fill <= SOH_DATA_LEN {
                (SOH, SOH_DATA_LEN)
            } else {
                (STX, STX_DATA_LEN)
            };
            ctx.block[fill..data_len].fill(EOF);

            let mut retries = 0;
            loop {
                if retries >= ctx.config.max_errors {
                    return Err(Error::AckError);
                }

                let (block, out) = ctx.block_and_frame();
                let len = frame::build(header, seq, &block[..data_len], out)?;
                if ctx.send_frame(len).is_err() {
                    retries += 1;
                    continue;
                }

                match ctx.recv_byte(ctx.config.wait_packet_timeout_ms) {
                    Ok(ACK) => break,
                    // The receiver's handshake 'C' can arrive duplicated
                    // just ahead of the first data ACK.
                    Ok(CRC) if first_packet => break,
                    Ok(CAN) => return Err(Error::Cancelled),
                    Ok(NAK) => {
                        debug!("packet {seq} NAKed, retrying");
                        retries += 1;
                    }
                    Ok(_) | Err(Error::Timeout) => retries += 1,
                    Err(e) => return Err(e),
                }
            }

            seq = seq.wrapping_add(1);
            sent += fill as u64;
            first_packet = false;
            on_progress(sent, ctx.file_size);

            if last {
                break;
            }
        }

        Ok(())
    }

    /// Two-EOT close followed by the all-zero batch terminator.
    fn finish(ctx: &mut Context<T, F>) -> Result<()> {
        ctx.stage = Stage::Finishing;

        let mut naked = false;
        for _ in 0..ctx.config.max_errors {
            if !ctx.send_byte(EOT) {
                return Err(Error::WrongCode);
            }
            match ctx.recv_byte(ctx.config.wait_packet_timeout_ms) {
                Ok(NAK) => {
                    naked = true;
                    break;
                }
                Ok(CAN) => return Err(Error::Cancelled),
                Ok(_) | Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
        }
        if !naked {
            return Err(Error::AckError);
        }

        if !ctx.send_byte(EOT) {
            return Err(Error::WrongCode);
        }
        match ctx.recv_byte(ctx.config.wait_packet_timeout_ms) {
            // A NAK here means the receiver wants the EOT again but will
            // proceed; both answers move the session forward.
            Ok(ACK) | Ok(NAK) => {}
            Ok(CAN) => return Err(Error::Cancelled),
            _ => return Err(Error::AckError),
        }

        // The 'C' requesting the terminator packet is nice to have; some
        // receivers never send it.
        for _ in 0..ctx.config.max_errors {
            match ctx.recv_byte(ctx.config.wait_packet_timeout_ms) {
                Ok(CRC) => break,
                Ok(CAN) => return Err(Error::Cancelled),
                Ok(_) | Err(Error::Timeout) => continue,
                Err(e) => return Err(e),
            }
        }

        let zero = [0u8; SOH_DATA_LEN];
        let len = frame::build(SOH, 0, &zero, &mut ctx.frame)?;
        ctx.send_frame(len)?;

        // The final ACK is equally optional; the file is already across.
        match ctx.recv_byte(ctx.config.wait_packet_timeout_ms) {
            Ok(b) => debug!("terminator reply {b:#04X}"),
            Err(_) => debug!("no terminator reply"),
        }

        ctx.stage = Stage::Finished;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::MemFs;
    use crate::frame::check;
    use crate::transport::ScriptTransport;

    fn quick_config() -> Config {
        Config { wait_packet_timeout_ms: 20, handshake_interval_ms: 20, ..Config::default() }
    }

    /// Scripted replies for a complete single-packet transfer.
    fn happy_replies(t: &mut ScriptTransport) {
        t.push_bytes(&[CRC]); // handshake
        t.push_bytes(&[ACK, CRC]); // packet 0 reply
        t.push_bytes(&[ACK]); // data packet 1
        t.push_bytes(&[NAK]); // first EOT
        t.push_bytes(&[ACK]); // second EOT
        t.push_bytes(&[CRC]); // terminator request
        t.push_bytes(&[ACK]); // terminator ack
    }

    #[test]
    fn happy_path_small_file() {
        let mut t = ScriptTransport::new();
        happy_replies(&mut t);

        let fs = MemFs::with_file("a.bin", &[0x41, 0x42, 0x43]);
        let mut sender = Sender::new(t, fs, quick_config());
        sender.send_file("a.bin", 3, |_, _| {}).unwrap();
        assert_eq!(sender.stage(), Stage::Finished);

        let writes = sender.ctx.transport_writes();
        // packet 0 + one SOH data packet + EOT,EOT + terminator packet.
        assert_eq!(writes.len(), 133 + 133 + 1 + 1 + 133);

        // Packet 0 carries the name and size.
        let (seq, payload) = check(&writes[..133]).unwrap();
        assert_eq!(seq, 0);
        let info = frame::decode_file_info(payload).unwrap().unwrap();
        assert_eq!(info.filename, "a.bin");
        assert_eq!(info.size, 3);

        // Data packet: seq 1, payload padded with EOF.
        let (seq, payload) = check(&writes[133..266]).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(&payload[..3], &[0x41, 0x42, 0x43]);
        assert!(payload[3..].iter().all(|&b| b == EOF));

        assert_eq!(writes[266], EOT);
        assert_eq!(writes[267], EOT);

        // Terminator: seq 0, all-zero payload.
        let (seq, payload) = check(&writes[268..]).unwrap();
        assert_eq!(seq, 0);
        assert!(payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn lone_c_counts_as_ack_plus_c() {
        let mut t = ScriptTransport::new();
        t.push_bytes(&[CRC]); // handshake
        t.push_bytes(&[CRC]); // ACK lost, only 'C' arrives
        t.push_bytes(&[ACK, NAK, ACK, CRC, ACK]);

        let fs = MemFs::with_file("a.bin", b"xyz");
        let mut sender = Sender::new(t, fs, quick_config());
        sender.send_file("a.bin", 3, |_, _| {}).unwrap();
        assert_eq!(sender.stage(), Stage::Finished);
    }

    #[test]
    fn delayed_c_after_ack() {
        let mut t = ScriptTransport::new();
        t.push_bytes(&[CRC]); // handshake
        t.push_bytes(&[ACK]); // ACK arrives...
        t.push_timeout(); // ...then the 'C' is late
        t.push_bytes(&[CRC]);
        t.push_bytes(&[ACK, NAK, ACK, CRC, ACK]);

        let fs = MemFs::with_file("a.bin", b"xyz");
        let mut sender = Sender::new(t, fs, quick_config());
        sender.send_file("a.bin", 3, |_, _| {}).unwrap();
        assert_eq!(sender.stage(), Stage::Finished);
    }

    #[test]
    fn nak_triggers_retransmission() {
        let mut t = ScriptTransport::new();
        t.push_bytes(&[CRC]);
        t.push_bytes(&[ACK, CRC]);
        t.push_bytes(&[NAK, ACK]); // first attempt refused
        t.push_bytes(&[NAK, ACK, CRC, ACK]);

        let fs = MemFs::with_file("a.bin", b"xyz");
        let mut sender = Sender::new(t, fs, quick_config());
        sender.send_file("a.bin", 3, |_, _| {}).unwrap();

        // The data packet went out twice, identically.
        let writes = sender.ctx.transport_writes();
        assert_eq!(writes.len(), 133 * 2 + 133 + 2 + 133);
        assert_eq!(&writes[133..266], &writes[266..399]);
    }

    #[test]
    fn can_reply_cancels_immediately() {
        let mut t = ScriptTransport::new();
        t.push_bytes(&[CRC]);
        t.push_bytes(&[ACK, CRC]);
        t.push_bytes(&[CAN]);

        let fs = MemFs::with_file("big.bin", &[7u8; 4096]);
        let mut sender = Sender::new(t, fs, quick_config());
        let err = sender.send_file("big.bin", 3, |_, _| {}).unwrap_err();

        assert_eq!(err, Error::Cancelled);
        assert_eq!(sender.ctx.open_handle_count(), 0);
        // Cancellation is immediate: nothing after the first data packet.
        assert_eq!(sender.ctx.transport_writes().len(), 133 + 3 + STX_DATA_LEN + 2);
    }

    #[test]
    fn retry_budget_exhaustion_is_ack_error() {
        let mut t = ScriptTransport::new();
        t.push_bytes(&[CRC]);
        t.push_bytes(&[ACK, CRC]);
        for _ in 0..5 {
            t.push_bytes(&[NAK]);
        }

        let fs = MemFs::with_file("a.bin", b"xyz");
        let mut sender = Sender::new(t, fs, quick_config());
        let err = sender.send_file("a.bin", 3, |_, _| {}).unwrap_err();

        assert_eq!(err, Error::AckError);
        assert_eq!(sender.stage(), Stage::Transmitting);
        assert_eq!(sender.ctx.open_handle_count(), 0);
    }

    #[test]
    fn handshake_timeout() {
        let mut t = ScriptTransport::new();
        for _ in 0..3 {
            t.push_timeout();
        }

        let fs = MemFs::with_file("a.bin", b"xyz");
        let mut sender = Sender::new(t, fs, quick_config());
        let err = sender.send_file("a.bin", 3, |_, _| {}).unwrap_err();

        assert_eq!(err, Error::Timeout);
        assert_eq!(sender.stage(), Stage::Establishing);
        assert_eq!(sender.ctx.open_handle_count(), 0);
    }

    #[test]
    fn oversized_name_fails_before_any_bytes() {
        let name = "x".repeat(300);
        let fs = MemFs::with_file(&name, b"data");
        let mut sender = Sender::new(ScriptTransport::new(), fs, quick_config());
        let err = sender.send_file(&name, 3, |_, _| {}).unwrap_err();

        assert_eq!(err, Error::WrongDataSize);
        assert!(sender.ctx.transport_writes().is_empty());
        assert_eq!(sender.ctx.open_handle_count(), 0);
    }

    #[test]
    fn empty_file_sends_no_data_packets() {
        let mut t = ScriptTransport::new();
        t.push_bytes(&[CRC]);
        t.push_bytes(&[ACK, CRC]);
        t.push_bytes(&[NAK, ACK, CRC, ACK]); // straight to the finish

        let fs = MemFs::with_file("empty", b"");
        let mut sender = Sender::new(t, fs, quick_config());
        sender.send_file("empty", 3, |_, _| {}).unwrap();

        // packet 0, two EOTs, terminator. No data packets.
        assert_eq!(sender.ctx.transport_writes().len(), 133 + 2 + 133);
    }

    #[test]
    fn progress_reports_acknowledged_bytes() {
        let mut t = ScriptTransport::new();
        t.push_bytes(&[CRC]);
        t.push_bytes(&[ACK, CRC]);
        t.push_bytes(&[ACK, ACK]); // one STX + one SOH packet
        t.push_bytes(&[NAK, ACK, CRC, ACK]);

        let fs = MemFs::with_file("f", &[9u8; 1025]);
        let mut sender = Sender::new(t, fs, quick_config());
        let seen = std::cell::RefCell::new(Vec::new());
        sender.send_file("f", 3, |sent, total| seen.borrow_mut().push((sent, total))).unwrap();

        assert_eq!(*seen.borrow(), vec![(1024, 1025), (1025, 1025)]);
    }
}
