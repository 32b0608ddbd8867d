//! Loss/timeout channel adapter.
//!
//! Real networks drop datagrams; the protocol's retransmission logic can
//! only be exercised if the test network does too.  [`LossyChannel`] wraps a
//! [`crate::socket::Socket`] with:
//!
//! | Knob               | Description                                        |
//! |--------------------|----------------------------------------------------|
//! | `loss_probability` | Drop an outbound datagram with this probability.   |
//! | `timeout`          | Per-call deadline on sends and receives.           |
//! | `rng_seed`         | Fixed RNG seed so lossy test runs are reproducible.|
//!
//! A "lost" send still returns `Ok(len)` — from the sender's point of view
//! the datagram went out and silently vanished, which is exactly what the
//! retransmission path must cope with.  A deadline that elapses surfaces as
//! [`ChannelError::Timeout`], which callers treat as "assume lost, retry".
//! Genuine I/O failures surface as [`ChannelError::Io`] and are fatal.
//!
//! The adapter is used identically by the sending and receiving paths; with
//! `loss_probability` at its default of `0.0` it is a transparent
//! pass-through suitable for production.
//!
//! Note: the adapter does **not** serialize concurrent reads.  The
//! connection dispatcher owns a wire guard for that (see
//! [`crate::connection`]).

use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::socket::Socket;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from channel operations.
#[derive(Debug)]
pub enum ChannelError {
    /// The per-call deadline elapsed.  An implicit loss signal — retry.
    Timeout,
    /// Underlying I/O error from the OS.  Fatal.
    Io(io::Error),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "channel deadline exceeded"),
            Self::Io(e) => write!(f, "channel I/O error: {e}"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// ChannelConfig
// ---------------------------------------------------------------------------

/// Fault-model and deadline configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Per-call read/write deadline.
    pub timeout: Duration,
    /// Probability in `[0.0, 1.0]` that an outbound datagram is dropped.
    ///
    /// Test/simulation only; production builds keep the default `0.0`.
    pub loss_probability: f64,
    /// Seed for the loss RNG.  `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        // Transparent pass-through by default.
        Self {
            timeout: Duration::from_millis(1000),
            loss_probability: 0.0,
            rng_seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LossyChannel
// ---------------------------------------------------------------------------

/// A fault-injecting, deadline-enforcing wrapper around [`Socket`].
#[derive(Debug)]
pub struct LossyChannel {
    socket: Socket,
    config: ChannelConfig,
    /// Loss-draw RNG.  `SmallRng` is not `Sync`; the lock is held only for
    /// the draw itself, never across an await.
    rng: Mutex<SmallRng>,
}

impl LossyChannel {
    /// Wrap `socket` with the given fault model.
    pub fn new(socket: Socket, config: ChannelConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            socket,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Address the underlying socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Send `buf` to `dest`, subject to synthetic loss and the deadline.
    ///
    /// A loss draw below `loss_probability` reports success without the
    /// datagram reaching the wire.
    pub async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<usize, ChannelError> {
        if self.draw_loss() {
            log::debug!("[chan] simulated loss of {} byte datagram", buf.len());
            return Ok(buf.len());
        }

        match tokio::time::timeout(self.config.timeout, self.socket.send_to(buf, dest)).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => Err(ChannelError::Timeout),
        }
    }

    /// Receive the next datagram into `buf` within the configured deadline.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), ChannelError> {
        self.recv_from_within(buf, self.config.timeout).await
    }

    /// Receive with an explicit deadline (used by the drain worker, which
    /// polls with a shorter interval so it never monopolises the wire guard).
    pub async fn recv_from_within(
        &self,
        buf: &mut [u8],
        deadline: Duration,
    ) -> Result<(usize, SocketAddr), ChannelError> {
        match tokio::time::timeout(deadline, self.socket.recv_from(buf)).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => Err(ChannelError::Timeout),
        }
    }

    fn draw_loss(&self) -> bool {
        if self.config.loss_probability <= 0.0 {
            return false;
        }
        let mut rng = self.rng.lock().expect("loss RNG lock poisoned");
        rng.gen::<f64>() < self.config.loss_probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_pair(config: ChannelConfig) -> (LossyChannel, LossyChannel) {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (
            LossyChannel::new(a, config.clone()),
            LossyChannel::new(b, config),
        )
    }

    #[tokio::test]
    async fn passthrough_delivers() {
        let (a, b) = loopback_pair(ChannelConfig::default()).await;

        a.send_to(b"ping", b.local_addr()).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, addr) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(addr, a.local_addr());
    }

    #[tokio::test]
    async fn total_loss_times_out_receiver() {
        let config = ChannelConfig {
            timeout: Duration::from_millis(50),
            loss_probability: 1.0,
            rng_seed: Some(7),
        };
        let (a, b) = loopback_pair(config).await;

        // The send itself reports success...
        let n = a.send_to(b"gone", b.local_addr()).await.unwrap();
        assert_eq!(n, 4);

        // ...but nothing arrives.
        let mut buf = [0u8; 16];
        match b.recv_from(&mut buf).await {
            Err(ChannelError::Timeout) => {}
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recv_deadline_elapses_on_silence() {
        let config = ChannelConfig {
            timeout: Duration::from_millis(20),
            ..ChannelConfig::default()
        };
        let (_a, b) = loopback_pair(config).await;

        let mut buf = [0u8; 16];
        assert!(matches!(
            b.recv_from(&mut buf).await,
            Err(ChannelError::Timeout)
        ));
    }

    #[tokio::test]
    async fn seeded_loss_is_deterministic() {
        let make = |seed| {
            let mut cfg = ChannelConfig::default();
            cfg.loss_probability = 0.5;
            cfg.rng_seed = Some(seed);
            cfg
        };

        let (a1, _) = loopback_pair(make(42)).await;
        let (a2, _) = loopback_pair(make(42)).await;

        let draws1: Vec<bool> = (0..64).map(|_| a1.draw_loss()).collect();
        let draws2: Vec<bool> = (0..64).map(|_| a2.draw_loss()).collect();
        assert_eq!(draws1, draws2);
    }
}
