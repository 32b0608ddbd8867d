//! Connection dispatcher: serialized stop-and-wait exchanges + public API.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │ write(data) / read(buf)
//!      ▼
//!  Connection / Listener ── frame::split / frame::Assembler
//!      │ Request::{Send, Recv} (mpsc, one oneshot reply each)
//!      ▼
//!  dispatcher task ── exactly one exchange at a time
//!      │                          drain task ── re-acks duplicates
//!      │  wire guard (tokio Mutex) serializes ──┘   between requests
//!      ▼
//!  PeerState { SawSender, SawReceiver }  (std Mutex, never held across await)
//!      │
//!  Arc<LossyChannel> → Socket → UDP
//! ```
//!
//! The dispatcher task pops one request at a time from the queue and runs
//! the full stop-and-wait exchange for it while holding the wire guard, so
//! all segments per direction are strictly ordered and at most one is
//! unacknowledged.  The drain task takes the guard between requests and
//! polls the socket with a short deadline: when a retransmitted segment
//! matches a cached acknowledgment it re-sends that ack immediately, which
//! lets the peer's retry succeed even while no `read` is in progress.  Any
//! other datagram it picks up is discarded — the peer's retransmission
//! recovers it once a real request is active.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::channel::{ChannelConfig, ChannelError, LossyChannel};
use crate::checksum;
use crate::frame::{self, Assembler};
use crate::receiver::{SawReceiver, Verdict};
use crate::segment::{Segment, HEADER_LEN};
use crate::sender::SawSender;
use crate::socket::Socket;

/// How long the drain task waits for a datagram before yielding the wire
/// guard back to pending requests.
const DRAIN_POLL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Per-connection tuning knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deadline for each individual send/receive on the wire.
    pub timeout: Duration,
    /// Maximum payload bytes per segment.
    pub max_segment_size: usize,
    /// Synthetic loss probability.  Test/simulation only; defaults to 0.
    pub loss_probability: f64,
    /// Seed for the loss RNG; `None` seeds from entropy.
    pub rng_seed: Option<u64>,
    /// Attempts per exchange before giving up with
    /// [`ConnError::RetriesExhausted`].
    pub max_retries: u32,
    /// Engage the optional checksum layer on both directions.
    pub verify_checksum: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            max_segment_size: 1024,
            loss_probability: 0.0,
            rng_seed: None,
            max_retries: 64,
            verify_checksum: false,
        }
    }
}

impl Config {
    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            timeout: self.timeout,
            loss_probability: self.loss_probability,
            rng_seed: self.rng_seed,
        }
    }

    /// Datagram buffer large enough for any segment of this connection.
    fn recv_buf(&self) -> Vec<u8> {
        vec![0u8; HEADER_LEN + self.max_segment_size]
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced to the caller.
///
/// Protocol-level trouble (timeouts, stale acks, malformed or duplicate
/// segments) is recovered internally and never appears here; only genuine
/// socket failures and exhausted retry budgets escape.
#[derive(Debug)]
pub enum ConnError {
    /// Unrecoverable I/O error from the OS.
    Socket(io::Error),
    /// The retry budget for one exchange ran out.
    RetriesExhausted,
    /// The connection's worker tasks have shut down.
    Closed,
}

impl std::fmt::Display for ConnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Socket(e) => write!(f, "socket failure: {e}"),
            Self::RetriesExhausted => write!(f, "retry budget exhausted"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for ConnError {}

impl From<io::Error> for ConnError {
    fn from(e: io::Error) -> Self {
        Self::Socket(e)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher plumbing
// ---------------------------------------------------------------------------

/// All mutable protocol state for one endpoint.
///
/// The two directions are independent: the sender pair tracks segments we
/// originate, the receiver pair tracks segments the peer originates.
#[derive(Debug, Default)]
struct PeerState {
    sender: SawSender,
    receiver: SawReceiver,
}

/// One payload delivered by the receiver state machine.
#[derive(Debug)]
struct Delivery {
    payload: Vec<u8>,
    fin: bool,
    peer: SocketAddr,
}

/// Tagged commands accepted by the dispatcher task.
enum Request {
    Send {
        payload: Vec<u8>,
        fin: bool,
        peer: SocketAddr,
        reply: oneshot::Sender<Result<usize, ConnError>>,
    },
    Recv {
        expect_peer: Option<SocketAddr>,
        reply: oneshot::Sender<Result<Delivery, ConnError>>,
    },
}

/// Shared internals of [`Connection`] and [`Listener`]: the channel, the
/// two worker tasks, and the request queue feeding the dispatcher.
struct Endpoint {
    channel: Arc<LossyChannel>,
    request_tx: mpsc::Sender<Request>,
    /// Requests queued or in flight.  The drain task only reads the socket
    /// while this is zero, so it never consumes a datagram an active
    /// request is waiting for.
    pending: Arc<AtomicUsize>,
    dispatcher: JoinHandle<()>,
    drain: JoinHandle<()>,
}

impl Endpoint {
    async fn open(local: SocketAddr, config: Config) -> Result<Self, ConnError> {
        let socket = Socket::bind(local).await?;
        let channel = Arc::new(LossyChannel::new(socket, config.channel_config()));
        let state = Arc::new(StdMutex::new(PeerState::default()));
        let wire = Arc::new(AsyncMutex::new(()));
        let pending = Arc::new(AtomicUsize::new(0));
        let (request_tx, request_rx) = mpsc::channel(16);

        let dispatcher = tokio::spawn(dispatch_loop(
            Arc::clone(&channel),
            Arc::clone(&state),
            Arc::clone(&wire),
            Arc::clone(&pending),
            config.clone(),
            request_rx,
        ));
        let drain = tokio::spawn(drain_loop(
            Arc::clone(&channel),
            Arc::clone(&state),
            Arc::clone(&wire),
            Arc::clone(&pending),
            config,
        ));

        Ok(Self {
            channel,
            request_tx,
            pending,
            dispatcher,
            drain,
        })
    }

    fn local_addr(&self) -> SocketAddr {
        self.channel.local_addr()
    }

    async fn send(&self, payload: Vec<u8>, fin: bool, peer: SocketAddr) -> Result<usize, ConnError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Request::Send {
            payload,
            fin,
            peer,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ConnError::Closed)?
    }

    async fn recv(&self, expect_peer: Option<SocketAddr>) -> Result<Delivery, ConnError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Request::Recv { expect_peer, reply }).await?;
        rx.await.map_err(|_| ConnError::Closed)?
    }

    async fn submit(&self, request: Request) -> Result<(), ConnError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.request_tx.send(request).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnError::Closed);
        }
        Ok(())
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.dispatcher.abort();
        self.drain.abort();
    }
}

// ---------------------------------------------------------------------------
// Dispatcher task
// ---------------------------------------------------------------------------

/// Process one request at a time, holding the wire guard for the full
/// stop-and-wait exchange so the drain task cannot steal its datagrams.
async fn dispatch_loop(
    channel: Arc<LossyChannel>,
    state: Arc<StdMutex<PeerState>>,
    wire: Arc<AsyncMutex<()>>,
    pending: Arc<AtomicUsize>,
    config: Config,
    mut request_rx: mpsc::Receiver<Request>,
) {
    while let Some(request) = request_rx.recv().await {
        let _guard = wire.lock().await;
        match request {
            Request::Send {
                payload,
                fin,
                peer,
                reply,
            } => {
                let result = run_send(&channel, &state, &config, payload, fin, peer).await;
                let _ = reply.send(result);
            }
            Request::Recv { expect_peer, reply } => {
                let result = run_recv(&channel, &state, &config, expect_peer).await;
                let _ = reply.send(result);
            }
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One outbound stop-and-wait exchange: transmit until the matching
/// acknowledgment arrives or the retry budget runs out.
async fn run_send(
    channel: &LossyChannel,
    state: &StdMutex<PeerState>,
    config: &Config,
    payload: Vec<u8>,
    fin: bool,
    peer: SocketAddr,
) -> Result<usize, ConnError> {
    let n = payload.len();

    // Toggle the bit and bump the counter before the first attempt; every
    // retransmission reuses the identical bytes.
    let (bytes, seq_num) = {
        let mut st = state.lock().expect("protocol state lock poisoned");
        st.sender.advance();
        let seg = st.sender.build_segment(payload, fin, config.verify_checksum);
        (seg.encode(), seg.header.seq_num)
    };

    let mut buf = config.recv_buf();
    for attempt in 0..config.max_retries {
        if attempt > 0 {
            log::debug!("[saw] → DATA seq={seq_num} retransmit #{attempt}");
        } else {
            log::debug!("[saw] → DATA seq={seq_num} len={n} fin={fin}");
        }

        match channel.send_to(&bytes, peer).await {
            Ok(_) => {}
            Err(ChannelError::Timeout) => continue,
            Err(ChannelError::Io(e)) => return Err(ConnError::Socket(e)),
        }

        let (len, from) = match channel.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(ChannelError::Timeout) => continue,
            Err(ChannelError::Io(e)) => return Err(ConnError::Socket(e)),
        };
        if from != peer {
            continue;
        }

        let ack = match Segment::decode(&buf[..len]) {
            Ok(seg) => seg,
            Err(e) => {
                log::debug!("[saw] undecodable ack from {from}: {e}");
                continue;
            }
        };

        let matched = {
            let st = state.lock().expect("protocol state lock poisoned");
            st.sender.matches_ack(&ack)
        };
        if matched {
            log::debug!("[saw] ← ACK seq={seq_num}");
            return Ok(n);
        }
        // Stale ack for a superseded exchange; resend the original segment.
        log::debug!(
            "[saw] ← stale ACK bit={} seq={} (want seq={seq_num})",
            ack.header.ack_bit,
            ack.header.seq_num
        );
    }

    Err(ConnError::RetriesExhausted)
}

/// One inbound stop-and-wait exchange: loop until a new in-sequence segment
/// is accepted, re-acknowledging duplicates and out-of-turn segments along
/// the way.
async fn run_recv(
    channel: &LossyChannel,
    state: &StdMutex<PeerState>,
    config: &Config,
    expect_peer: Option<SocketAddr>,
) -> Result<Delivery, ConnError> {
    let mut buf = config.recv_buf();
    // Where to direct state-preserving re-acks before the first datagram of
    // this exchange arrives.
    let mut reply_to = expect_peer;

    for _attempt in 0..config.max_retries {
        let (len, from) = match channel.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(ChannelError::Timeout) => {
                // The peer may be retrying because our last ack was lost.
                if let Some(addr) = reply_to {
                    send_ack(channel, current_ack(state), addr).await?;
                }
                continue;
            }
            Err(ChannelError::Io(e)) => return Err(ConnError::Socket(e)),
        };
        if let Some(p) = expect_peer {
            if from != p {
                continue;
            }
        }
        reply_to = Some(from);

        let seg = match Segment::decode(&buf[..len]) {
            Ok(seg) => seg,
            Err(e) => {
                log::debug!("[saw] undecodable datagram from {from}: {e}");
                send_ack(channel, current_ack(state), from).await?;
                continue;
            }
        };

        // Zero-length non-fin segments are stray acknowledgments (e.g. a
        // late duplicate ack for a finished send), never data.
        if seg.payload.is_empty() && !seg.is_fin() {
            continue;
        }

        if config.verify_checksum && !checksum::verify(&seg.payload, seg.header.checksum) {
            log::debug!("[saw] checksum mismatch on seq={}", seg.header.seq_num);
            send_ack(channel, current_ack(state), from).await?;
            continue;
        }

        let (verdict, ack) = {
            let mut st = state.lock().expect("protocol state lock poisoned");
            let verdict = st.receiver.classify(&seg);
            let ack = match verdict {
                Verdict::Accept => {
                    st.receiver.accept(&seg);
                    st.receiver.current_ack()
                }
                Verdict::Duplicate => st
                    .receiver
                    .cached_ack(seg.header.seq_num)
                    .unwrap_or_else(|| st.receiver.current_ack()),
                Verdict::Unexpected => st.receiver.current_ack(),
            };
            (verdict, ack)
        };

        match verdict {
            Verdict::Accept => {
                log::debug!(
                    "[saw] ← DATA seq={} len={} fin={}; → ACK",
                    seg.header.seq_num,
                    seg.payload.len(),
                    seg.is_fin()
                );
                send_ack(channel, ack, from).await?;
                let fin = seg.is_fin();
                return Ok(Delivery {
                    payload: seg.payload,
                    fin,
                    peer: from,
                });
            }
            Verdict::Duplicate => {
                log::debug!("[saw] ← duplicate seq={}; re-ACK", seg.header.seq_num);
                send_ack(channel, ack, from).await?;
            }
            Verdict::Unexpected => {
                log::debug!(
                    "[saw] ← out-of-turn seq={} bit={}; re-ACK current",
                    seg.header.seq_num,
                    seg.header.ack_bit
                );
                send_ack(channel, ack, from).await?;
            }
        }
    }

    Err(ConnError::RetriesExhausted)
}

fn current_ack(state: &StdMutex<PeerState>) -> Segment {
    state
        .lock()
        .expect("protocol state lock poisoned")
        .receiver
        .current_ack()
}

/// Transmit an acknowledgment.  Subject to the same loss model as data; a
/// dropped ack is resolved by the peer retrying.
async fn send_ack(channel: &LossyChannel, ack: Segment, dest: SocketAddr) -> Result<(), ConnError> {
    match channel.send_to(&ack.encode(), dest).await {
        Ok(_) | Err(ChannelError::Timeout) => Ok(()),
        Err(ChannelError::Io(e)) => Err(ConnError::Socket(e)),
    }
}

// ---------------------------------------------------------------------------
// Drain task
// ---------------------------------------------------------------------------

/// Continuously service the wire between requests.
///
/// Retransmitted segments whose acknowledgment is cached get re-acked
/// immediately, so a peer's retry is not stalled until the application
/// issues its next `read`.  Everything else is discarded; stop-and-wait
/// retransmission delivers it to the next active request instead.
async fn drain_loop(
    channel: Arc<LossyChannel>,
    state: Arc<StdMutex<PeerState>>,
    wire: Arc<AsyncMutex<()>>,
    pending: Arc<AtomicUsize>,
    config: Config,
) {
    let mut buf = config.recv_buf();

    loop {
        // Stand down while requests are queued or active; their exchanges
        // own the wire and must see every datagram.
        if pending.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(DRAIN_POLL).await;
            continue;
        }

        // Taken and released every pass so queued requests interleave.
        let _guard = wire.lock().await;

        let (len, from) = match channel.recv_from_within(&mut buf, DRAIN_POLL).await {
            Ok(v) => v,
            Err(ChannelError::Timeout) => continue,
            Err(ChannelError::Io(e)) => {
                log::warn!("[saw:drain] socket error, stopping: {e}");
                break;
            }
        };

        let seg = match Segment::decode(&buf[..len]) {
            Ok(seg) => seg,
            Err(_) => continue,
        };
        if seg.payload.is_empty() && !seg.is_fin() {
            continue; // stray ack
        }

        let cached = {
            let st = state.lock().expect("protocol state lock poisoned");
            match st.receiver.classify(&seg) {
                Verdict::Duplicate => st.receiver.cached_ack(seg.header.seq_num),
                _ => None,
            }
        };
        match cached {
            Some(ack) => {
                log::debug!("[saw:drain] re-ACK duplicate seq={}", seg.header.seq_num);
                let _ = channel.send_to(&ack.encode(), from).await;
            }
            None => {
                log::debug!(
                    "[saw:drain] dropping out-of-turn seq={} (no request active)",
                    seg.header.seq_num
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stream framing over the dispatcher
// ---------------------------------------------------------------------------

/// Send one logical message: ≤-MSS chunks, then the zero-length fin marker.
async fn write_message(
    endpoint: &Endpoint,
    config: &Config,
    data: &[u8],
    peer: SocketAddr,
) -> Result<usize, ConnError> {
    let mut n = 0;
    for (chunk, fin) in frame::split(data, config.max_segment_size) {
        n += endpoint.send(chunk.to_vec(), fin, peer).await?;
    }
    Ok(n)
}

/// Receive one logical message into `buf`.
///
/// Accumulates until the buffer is full or fin is observed; if the buffer
/// filled first, one extra receive consumes the trailing fin marker.
async fn read_message(
    endpoint: &Endpoint,
    buf: &mut [u8],
    expect_peer: Option<SocketAddr>,
) -> Result<(usize, SocketAddr), ConnError> {
    let mut asm = Assembler::new(buf);
    let mut peer = expect_peer;

    loop {
        let delivery = endpoint.recv(peer).await?;
        // Lock onto the first sender for the remainder of the message.
        peer = Some(delivery.peer);
        asm.push(&delivery.payload, delivery.fin);

        if asm.is_complete() {
            if asm.fin_pending() {
                let _ = endpoint.recv(peer).await?;
            }
            return Ok((asm.filled(), delivery.peer));
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Client-side handle: a reliable byte stream to one fixed peer.
pub struct Connection {
    endpoint: Endpoint,
    config: Config,
    peer: SocketAddr,
}

impl Connection {
    /// Resolve `address:port` and open a connection with the given per-call
    /// timeout and otherwise default configuration.
    pub async fn connect(address: &str, port: u16, timeout: Duration) -> Result<Self, ConnError> {
        let peer = resolve(address, port).await?;
        let config = Config {
            timeout,
            ..Config::default()
        };
        Self::connect_with(peer, config).await
    }

    /// Open a connection to `peer` with full control over [`Config`].
    pub async fn connect_with(peer: SocketAddr, config: Config) -> Result<Self, ConnError> {
        let endpoint = Endpoint::open(unspecified_for(peer), config.clone()).await?;
        log::debug!("[saw] connected {} → {peer}", endpoint.local_addr());
        Ok(Self {
            endpoint,
            config,
            peer,
        })
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    /// Send `data` as one logical message.  Returns the number of payload
    /// bytes confirmed by the peer (`data.len()` on success).
    pub async fn write(&self, data: &[u8]) -> Result<usize, ConnError> {
        write_message(&self.endpoint, &self.config, data, self.peer).await
    }

    /// Receive one logical message into `buf`, returning the byte count.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, ConnError> {
        let (n, _peer) = read_message(&self.endpoint, buf, Some(self.peer)).await?;
        Ok(n)
    }
}

/// Server-side handle: bound to a local address, talks to any peer.
pub struct Listener {
    endpoint: Endpoint,
    config: Config,
}

impl Listener {
    /// Resolve `address:port` and bind a listener with the given per-call
    /// timeout and otherwise default configuration.
    pub async fn bind(address: &str, port: u16, timeout: Duration) -> Result<Self, ConnError> {
        let local = resolve(address, port).await?;
        let config = Config {
            timeout,
            ..Config::default()
        };
        Self::bind_with(local, config).await
    }

    /// Bind to `local` with full control over [`Config`].
    pub async fn bind_with(local: SocketAddr, config: Config) -> Result<Self, ConnError> {
        let endpoint = Endpoint::open(local, config.clone()).await?;
        log::debug!("[saw] listening on {}", endpoint.local_addr());
        Ok(Self { endpoint, config })
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    /// Receive one logical message into `buf`.
    ///
    /// Returns the byte count and the peer that sent the message.
    pub async fn read(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), ConnError> {
        read_message(&self.endpoint, buf, None).await
    }

    /// Send `data` as one logical message to `peer`.
    pub async fn write(&self, data: &[u8], peer: SocketAddr) -> Result<usize, ConnError> {
        write_message(&self.endpoint, &self.config, data, peer).await
    }
}

/// Resolve a host/port pair to the first usable socket address.
async fn resolve(address: &str, port: u16) -> Result<SocketAddr, ConnError> {
    let mut addrs = tokio::net::lookup_host((address, port)).await?;
    addrs.next().ok_or_else(|| {
        ConnError::Socket(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {address}:{port}"),
        ))
    })
}

/// Unspecified local bind address of the same family as `peer`.
fn unspecified_for(peer: SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => "0.0.0.0:0".parse().expect("static addr"),
        SocketAddr::V6(_) => "[::]:0".parse().expect("static addr"),
    }
}
