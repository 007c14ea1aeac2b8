//! Packet framing for the YMODEM wire format.
//!
//! A packet is `[header][seq][!seq][data...][crc_hi][crc_lo]` where the
//! header selects the data length: SOH carries 128 bytes, STX carries 1024.
//! This module assembles and validates whole packets and encodes/decodes
//! the packet-0 payload (filename + decimal size).

use crate::crc::crc16_ccitt;
use crate::error::{Error, Result};

/// Start of Header - 128 byte block
pub const SOH: u8 = 0x01;
/// Start of Text - 1024 byte block
pub const STX: u8 = 0x02;
/// End of Transmission
pub const EOT: u8 = 0x04;
/// Acknowledge
pub const ACK: u8 = 0x06;
/// Negative Acknowledge
pub const NAK: u8 = 0x15;
/// Cancel transmission
pub const CAN: u8 = 0x18;
/// End of File padding character
pub const EOF: u8 = 0x1A;
/// CRC mode request character, ASCII 'C'
pub const CRC: u8 = 0x43;

/// Data length of a SOH packet.
pub const SOH_DATA_LEN: usize = 128;
/// Data length of an STX packet.
pub const STX_DATA_LEN: usize = 1024;
/// Header byte + sequence number + complement.
pub const PREFIX_LEN: usize = 3;
/// Big-endian CRC16 trailer.
pub const TRAILER_LEN: usize = 2;
/// Largest packet on the wire: STX prefix + data + CRC.
pub const MAX_PACKET_LEN: usize = PREFIX_LEN + STX_DATA_LEN + TRAILER_LEN;
/// Longest filename accepted in a packet-0 exchange.
pub const MAX_FILENAME_LEN: usize = 256;

/// Name and size announced by the sender in packet 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Basename of the transferred file.
    pub filename: String,
    /// Announced size in bytes; 0 when the sender did not include one.
    pub size: u64,
}

/// Data length implied by a packet header byte, if it is one.
pub fn data_len(header: u8) -> Option<usize> {
    match header {
        SOH => Some(SOH_DATA_LEN),
        STX => Some(STX_DATA_LEN),
        _ => None,
    }
}

/// Assembles a complete packet into `out` and returns its length.
///
/// The payload length must be exactly 128 (SOH) or 1024 (STX); the caller
/// pads short final blocks before framing.
pub fn build(header: u8, seq: u8, payload: &[u8], out: &mut [u8]) -> Result<usize> {
    let data_len = data_len(header).ok_or(Error::WrongCode)?;
    if payload.len() != data_len {
        return Err(Error::WrongDataSize);
    }
    let total = PREFIX_LEN + data_len + TRAILER_LEN;
    if out.len() < total {
        return Err(Error::WrongDataSize);
    }

    out[0] = header;
    out[1] = seq;
    out[2] = !seq;
    out[PREFIX_LEN..PREFIX_LEN + data_len].copy_from_slice(payload);

    let crc = crc16_ccitt(0, payload);
    out[total - 2] = (crc >> 8) as u8;
    out[total - 1] = (crc & 0xFF) as u8;

    Ok(total)
}

/// Validates a complete packet and returns its sequence number and payload.
///
/// `packet` must start at the header byte and span the whole frame.
pub fn check(packet: &[u8]) -> Result<(u8, &[u8])> {
    let data_len = packet.first().and_then(|&h| data_len(h)).ok_or(Error::WrongCode)?;
    let total = PREFIX_LEN + data_len + TRAILER_LEN;
    if packet.len() < total {
        return Err(Error::WrongDataSize);
    }

    let seq = packet[1];
    if packet[2] != !seq {
        return Err(Error::WrongSequence);
    }

    let payload = &packet[PREFIX_LEN..PREFIX_LEN + data_len];
    let received = ((packet[total - 2] as u16) << 8) | packet[total - 1] as u16;
    if crc16_ccitt(0, payload) != received {
        return Err(Error::WrongCrc);
    }

    Ok((seq, payload))
}

/// Encodes the packet-0 payload: filename, NUL, decimal size, zero fill.
///
/// Fails with [`Error::WrongDataSize`] when the name (or name + size
/// string) does not fit the 128-byte payload.
pub fn encode_file_info(name: &str, size: u64, payload: &mut [u8]) -> Result<()> {
    if payload.len() != SOH_DATA_LEN {
        return Err(Error::WrongDataSize);
    }

    let name = name.as_bytes();
    if name.len() >= SOH_DATA_LEN {
        return Err(Error::WrongDataSize);
    }

    let size_str = size.to_string();
    if name.len() + 1 + size_str.len() >= SOH_DATA_LEN {
        return Err(Error::WrongDataSize);
    }

    payload.fill(0);
    payload[..name.len()].copy_from_slice(name);
    payload[name.len() + 1..name.len() + 1 + size_str.len()].copy_from_slice(size_str.as_bytes());

    Ok(())
}

/// Decodes a packet-0 payload.
///
/// Returns `Ok(None)` for the batch terminator (NUL filename). A payload
/// without any NUL terminator is malformed and yields [`Error::FileError`].
/// Size digits stop at the first non-digit; an absent size decodes as 0.
pub fn decode_file_info(payload: &[u8]) -> Result<Option<FileInfo>> {
    if payload.first() == Some(&0) {
        return Ok(None);
    }

    let name_len = payload.iter().position(|&b| b == 0).ok_or(Error::FileError)?;
    if name_len >= MAX_FILENAME_LEN {
        return Err(Error::FileError);
    }
    let filename = String::from_utf8_lossy(&payload[..name_len]).into_owned();

    let mut size: u64 = 0;
    for &b in &payload[name_len + 1..] {
        if !b.is_ascii_digit() {
            break;
        }
        size = size * 10 + (b - b'0') as u64;
    }

    Ok(Some(FileInfo { filename, size }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_soh_layout() {
        let payload = [0xA5u8; SOH_DATA_LEN];
        let mut out = [0u8; MAX_PACKET_LEN];
        let len = build(SOH, 3, &payload, &mut out).unwrap();

        assert_eq!(len, PREFIX_LEN + SOH_DATA_LEN + TRAILER_LEN);
        assert_eq!(out[0], SOH);
        assert_eq!(out[1], 3);
        assert_eq!(out[2], 3u8 ^ 0xFF);
        let crc = crc16_ccitt(0, &payload);
        assert_eq!(out[len - 2], (crc >> 8) as u8);
        assert_eq!(out[len - 1], (crc & 0xFF) as u8);
    }

    #[test]
    fn build_rejects_wrong_payload_len() {
        let mut out = [0u8; MAX_PACKET_LEN];
        assert_eq!(build(STX, 1, &[0u8; 100], &mut out), Err(Error::WrongDataSize));
        assert_eq!(build(SOH, 1, &[0u8; STX_DATA_LEN], &mut out), Err(Error::WrongDataSize));
        assert_eq!(build(EOT, 1, &[0u8; SOH_DATA_LEN], &mut out), Err(Error::WrongCode));
    }

    #[test]
    fn check_round_trip() {
        let mut payload = [0u8; STX_DATA_LEN];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let mut out = [0u8; MAX_PACKET_LEN];
        let len = build(STX, 0xFE, &payload, &mut out).unwrap();

        let (seq, data) = check(&out[..len]).unwrap();
        assert_eq!(seq, 0xFE);
        assert_eq!(data, &payload[..]);
    }

    #[test]
    fn check_rejects_bad_complement() {
        let payload = [0u8; SOH_DATA_LEN];
        let mut out = [0u8; MAX_PACKET_LEN];
        let len = build(SOH, 9, &payload, &mut out).unwrap();
        out[2] ^= 0x01;
        assert_eq!(check(&out[..len]), Err(Error::WrongSequence));
    }

    #[test]
    fn check_rejects_bad_crc() {
        let payload = [7u8; SOH_DATA_LEN];
        let mut out = [0u8; MAX_PACKET_LEN];
        let len = build(SOH, 1, &payload, &mut out).unwrap();
        out[PREFIX_LEN + 5] ^= 0x40;
        assert_eq!(check(&out[..len]), Err(Error::WrongCrc));
    }

    #[test]
    fn check_rejects_unknown_header() {
        assert_eq!(check(&[0x7F, 0, 0xFF]), Err(Error::WrongCode));
    }

    #[test]
    fn file_info_round_trip() {
        let mut payload = [0xFFu8; SOH_DATA_LEN];
        encode_file_info("kernel.bin", 123456, &mut payload).unwrap();

        let info = decode_file_info(&payload).unwrap().unwrap();
        assert_eq!(info.filename, "kernel.bin");
        assert_eq!(info.size, 123456);
        // Everything past the size string is zero fill.
        assert!(payload["kernel.bin".len() + 1 + 6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn file_info_without_size() {
        let mut payload = [0u8; SOH_DATA_LEN];
        payload[..4].copy_from_slice(b"a.tx");

        let info = decode_file_info(&payload).unwrap().unwrap();
        assert_eq!(info.filename, "a.tx");
        assert_eq!(info.size, 0);
    }

    #[test]
    fn file_info_batch_terminator() {
        let payload = [0u8; SOH_DATA_LEN];
        assert_eq!(decode_file_info(&payload).unwrap(), None);
    }

    #[test]
    fn file_info_name_too_long() {
        let name = "x".repeat(127);
        let mut payload = [0u8; SOH_DATA_LEN];
        // 127-byte name + NUL leaves no room for even one size digit.
        assert_eq!(encode_file_info(&name, 0, &mut payload), Err(Error::WrongDataSize));
        assert_eq!(
            encode_file_info(&"y".repeat(200), 0, &mut payload),
            Err(Error::WrongDataSize)
        );
    }

    #[test]
    fn file_info_name_at_limit() {
        // 124-byte name + NUL + "12" + final NUL fill = 127 used bytes.
        let name = "z".repeat(124);
        let mut payload = [0u8; SOH_DATA_LEN];
        encode_file_info(&name, 12, &mut payload).unwrap();
        let info = decode_file_info(&payload).unwrap().unwrap();
        assert_eq!(info.filename, name);
        assert_eq!(info.size, 12);
    }
}
