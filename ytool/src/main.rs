//! Entry point for `ytool`.
//!
//! Parses CLI arguments and dispatches into the sender or the receiver.
//! All protocol work lives in the `ymodem` crate; this binary owns only
//! process setup (logging, argument parsing) and the link.

#[macro_use]
extern crate log;

mod link;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use ymodem::{Config, Receiver, Sender, StdFs};

use crate::link::{Link, SerialLink, TcpLink};

/// YMODEM file transfer over serial or TCP links.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Send a file to the peer.
    Send {
        #[command(flatten)]
        link: LinkArgs,
        /// Handshake timeout in seconds.
        #[arg(long, default_value_t = 60)]
        timeout: u32,
        /// File to send.
        file: String,
    },
    /// Receive a file from the peer.
    Recv {
        #[command(flatten)]
        link: LinkArgs,
        /// Handshake timeout in seconds.
        #[arg(long, default_value_t = 60)]
        timeout: u32,
        /// Directory the received file is written into.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Args)]
struct LinkArgs {
    /// Serial device (e.g. /dev/ttyUSB0).
    #[arg(long)]
    serial: Option<String>,
    /// Baud rate for the serial device.
    #[arg(long, default_value_t = 115200)]
    baud: u32,
    /// TCP address to connect to (e.g. 192.168.1.5:7878).
    #[arg(long, conflicts_with = "serial")]
    tcp: Option<String>,
    /// TCP address to listen on; the first connection is used.
    #[arg(long, conflicts_with_all = ["serial", "tcp"])]
    tcp_listen: Option<String>,
}

impl LinkArgs {
    fn open(&self) -> Result<Link> {
        if let Some(dev) = &self.serial {
            return Ok(Link::Serial(SerialLink::open(dev, self.baud)?));
        }
        if let Some(addr) = &self.tcp {
            return Ok(Link::Tcp(TcpLink::connect(addr)?));
        }
        if let Some(addr) = &self.tcp_listen {
            return Ok(Link::Tcp(TcpLink::listen(addr)?));
        }
        bail!("no link given; pass --serial, --tcp or --tcp-listen")
    }
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Send { link, timeout, file } => send(&link, timeout, &file),
        Cmd::Recv { link, timeout, out_dir } => recv(&link, timeout, &out_dir),
    }
}

fn send(link: &LinkArgs, timeout: u32, file: &str) -> Result<()> {
    let link = link.open()?;

    println!("{}", format!("Sending {file}, waiting for receiver...").bold().purple());

    let mut sender = Sender::new(link, StdFs::new(), Config::default());
    let res = sender.send_file(file, timeout, |sent, total| {
        print!("\r  {sent}/{total} bytes");
        std::io::stdout().flush().ok();
    });
    println!();

    match res {
        Ok(()) => {
            println!("{}", "Transfer complete".green().bold());
            Ok(())
        }
        Err(e) => {
            sender.cleanup();
            Err(anyhow!("transfer failed: {e} (code {})", e.code()))
        }
    }
}

fn recv(link: &LinkArgs, timeout: u32, out_dir: &Path) -> Result<()> {
    let link = link.open()?;

    println!("{}", format!("Receiving into {}...", out_dir.display()).bold().purple());

    let mut receiver = Receiver::new(link, StdFs::rooted(out_dir), Config::default());
    match receiver.recv_file(timeout) {
        Ok(Some(info)) => {
            println!(
                "{}",
                format!("Received {} ({} bytes)", info.filename, info.size).green().bold()
            );
            Ok(())
        }
        Ok(None) => {
            println!("{}", "Peer had nothing to send".yellow());
            Ok(())
        }
        Err(e) => {
            receiver.cleanup();
            Err(anyhow!("transfer failed: {e} (code {})", e.code()))
        }
    }
}
