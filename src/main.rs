//! Entry point for `saw-over-udp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode.  The client sends a file to the server as two logical messages: a
//! 4-byte big-endian length prefix, then the contents.  All protocol work is
//! delegated to library modules; `main.rs` owns only process setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use saw_over_udp::{Config, Connection, Listener};

/// Stop-and-wait reliable file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Receive a file and write it to disk.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0")]
        address: String,
        /// Local port to bind.
        #[arg(short, long, default_value_t = 8888)]
        port: u16,
        /// Per-exchange timeout in milliseconds.
        #[arg(short, long, default_value_t = 1000)]
        timeout: u64,
        /// Maximum segment payload size in bytes.
        #[arg(long, default_value_t = 1024)]
        mss: usize,
        /// Destination file name.
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Send a file to a server.
    Client {
        /// Remote server address.
        #[arg(short, long, default_value = "localhost")]
        address: String,
        /// Remote server port.
        #[arg(short, long, default_value_t = 8888)]
        port: u16,
        /// Per-exchange timeout in milliseconds.
        #[arg(short, long, default_value_t = 100)]
        timeout: u64,
        /// Maximum segment payload size in bytes.
        #[arg(long, default_value_t = 1024)]
        mss: usize,
        /// Synthetic loss probability (testing only).
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        /// File to send.
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.mode {
        Mode::Server {
            address,
            port,
            timeout,
            mss,
            file,
        } => run_server(&address, port, timeout, mss, &file).await,
        Mode::Client {
            address,
            port,
            timeout,
            mss,
            loss,
            file,
        } => run_client(&address, port, timeout, mss, loss, &file).await,
    };

    if let Err(e) = result {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server(
    address: &str,
    port: u16,
    timeout_ms: u64,
    mss: usize,
    file: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = Listener::bind_with(
        tokio::net::lookup_host((address, port))
            .await?
            .next()
            .ok_or_else(|| format!("cannot resolve {address}:{port}"))?,
        Config {
            timeout: Duration::from_millis(timeout_ms),
            max_segment_size: mss,
            // A server waiting for a client to appear should not give up.
            max_retries: u32::MAX,
            ..Config::default()
        },
    )
    .await?;
    log::info!("listening on {}", listener.local_addr());

    // Length prefix first, then the contents.
    let mut prefix = [0u8; 4];
    let (_, peer) = listener.read(&mut prefix).await?;
    let len = u32::from_be_bytes(prefix) as usize;
    log::info!("receiving {len} bytes from {peer}");

    let mut contents = vec![0u8; len];
    let (n, _) = listener.read(&mut contents).await?;
    contents.truncate(n);

    tokio::fs::write(file, &contents).await?;
    log::info!("wrote {n} bytes to {}", file.display());
    Ok(())
}

async fn run_client(
    address: &str,
    port: u16,
    timeout_ms: u64,
    mss: usize,
    loss: f64,
    file: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let contents = tokio::fs::read(file).await?;

    let peer = tokio::net::lookup_host((address, port))
        .await?
        .next()
        .ok_or_else(|| format!("cannot resolve {address}:{port}"))?;
    let conn = Connection::connect_with(
        peer,
        Config {
            timeout: Duration::from_millis(timeout_ms),
            max_segment_size: mss,
            loss_probability: loss,
            ..Config::default()
        },
    )
    .await?;
    log::info!("sending {} bytes to {peer}", contents.len());

    let prefix = (contents.len() as u32).to_be_bytes();
    conn.write(&prefix).await?;
    let n = conn.write(&contents).await?;
    log::info!("sent {n} bytes");
    Ok(())
}
