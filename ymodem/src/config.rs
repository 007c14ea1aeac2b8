//! Transfer tuning knobs with protocol-standard defaults.

/// Timing and retry configuration for a transfer.
///
/// The defaults match what YMODEM peers in the field expect; loosen the
/// timeouts for slow links or shorten them for loopback testing.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// How long to wait for a reply or for the body of a packet, in
    /// milliseconds.
    pub wait_packet_timeout_ms: u32,
    /// Pause between handshake attempts, in milliseconds. Also bounds the
    /// wait for the first header byte after each handshake 'C'.
    pub handshake_interval_ms: u32,
    /// How many consecutive errors (NAKs, timeouts, corrupt packets) are
    /// tolerated before the transfer is abandoned.
    pub max_errors: u32,
    /// Number of CAN bytes emitted by [`abort`](crate::context::Context::abort).
    pub can_send_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wait_packet_timeout_ms: 3000,
            handshake_interval_ms: 1000,
            max_errors: 5,
            can_send_count: 7,
        }
    }
}
