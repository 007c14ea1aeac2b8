//! # ymodem
//!
//! A portable implementation of the YMODEM file transfer protocol, usable
//! over any byte stream (UART, TCP, an in-memory pipe). YMODEM is the
//! stop-and-wait protocol behind U-Boot's `loady` and countless firmware
//! update paths.
//!
//! ## Protocol Overview
//!
//! YMODEM moves files in 128 or 1024 byte blocks protected by a CRC16-CCITT
//! and a sequence-number/complement pair. A transfer starts with the
//! receiver soliciting CRC mode ('C'), continues with a file-info packet
//! (name and size), streams data packets one acknowledgement at a time,
//! and closes with a double EOT plus an all-zero batch terminator.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ymodem::{Config, Receiver, Sender, StdFs};
//! # fn example(link: impl ymodem::Transport) -> ymodem::Result<()> {
//! // Send a file over an established link (e.g. a serial port).
//! let mut sender = Sender::new(link, StdFs::new(), Config::default());
//! sender.send_file("firmware.bin", 60, |sent, total| {
//!     println!("{sent}/{total} bytes");
//! })?;
//! # Ok(())
//! # }
//!
//! # fn example_recv(link: impl ymodem::Transport) -> ymodem::Result<()> {
//! // Receive whatever the peer offers into the current directory.
//! let mut receiver = Receiver::new(link, StdFs::new(), Config::default());
//! if let Some(info) = receiver.recv_file(60)? {
//!     println!("got {} ({} bytes)", info.filename, info.size);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`crc`] - CRC16-CCITT checksum implementation
//! - [`frame`] - packet framing and the file-info codec
//! - [`transport`] - the byte stream abstraction
//! - [`files`] - the file access abstraction and a `std::fs` adapter
//! - [`send`] / [`recv`] - the two protocol state machines

#[macro_use]
extern crate log;

/// CRC16-CCITT checksum implementation.
pub mod crc;

/// Transfer tuning knobs (timeouts, retry budgets).
pub mod config;

/// Transfer context: stage, buffers, and the link adapter.
pub mod context;

/// Error types and result definitions.
pub mod error;

/// File access abstraction.
pub mod files;

/// Packet framing for the YMODEM wire format.
pub mod frame;

/// Receiver state machine.
pub mod recv;

/// Sender state machine.
pub mod send;

/// Byte transport abstraction.
pub mod transport;

// Re-export the types a typical caller touches.
pub use config::Config;
pub use context::Stage;
pub use error::{Error, Result};
pub use files::{FileIo, StdFs};
pub use frame::FileInfo;
pub use recv::Receiver;
pub use send::Sender;
pub use transport::Transport;
