//! Error types and result definitions for YMODEM transfers.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong during a transfer.
///
/// Transient conditions (a single NAK, one bad CRC) are absorbed by the
/// retry budget inside the state machines; what surfaces here is either a
/// fatal condition or a transient one that exhausted
/// [`Config::max_errors`](crate::Config::max_errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The handshake or a packet wait expired.
    #[error("timed out waiting for the peer")]
    Timeout,
    /// An unexpected header/control byte, or an invalid argument.
    #[error("unexpected protocol code")]
    WrongCode,
    /// Sequence / complement mismatch, or sustained out-of-sequence packets.
    #[error("wrong packet sequence number")]
    WrongSequence,
    /// CRC16 of the received payload does not match the trailer.
    #[error("CRC check failed")]
    WrongCrc,
    /// A payload length invariant was broken, or data does not fit.
    #[error("wrong data size")]
    WrongDataSize,
    /// The peer sent CAN.
    #[error("transfer cancelled by peer")]
    Cancelled,
    /// An expected ACK or 'C' never arrived within the retry budget.
    #[error("acknowledgement not received")]
    AckError,
    /// A file operation failed or completed short.
    #[error("file operation failed")]
    FileError,
    /// Reserved; the protocol core never allocates.
    #[error("out of memory")]
    MemError,
}

impl Error {
    /// Stable numeric code for callers that check values rather than
    /// variants. Matches the classic C error numbering.
    pub fn code(&self) -> i32 {
        match self {
            Error::Timeout => -1,
            Error::WrongCode => -2,
            Error::WrongSequence => -3,
            Error::WrongCrc => -4,
            Error::WrongDataSize => -5,
            Error::Cancelled => -6,
            Error::AckError => -7,
            Error::FileError => -8,
            Error::MemError => -9,
        }
    }
}
