//! `saw-over-udp` — a stop-and-wait reliable byte stream over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   data segments   ┌──────────┐
//!  │  Sender  │──────────────────▶│ Receiver │
//!  └────┬─────┘                   └─────┬────┘
//!       │        alternating-bit        │
//!       │◀────── acknowledgments ───────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │       Connection / Listener       │
//!  │ (dispatcher task + drain task own │
//!  │   the shared bit/seq state)       │
//!  └────┬──────────────────────────────┘
//!       │ lossy, deadline-bounded datagrams
//!  ┌────▼──────────┐
//!  │ LossyChannel  │  (synthetic loss + timeouts over the UDP socket)
//!  └───────────────┘
//! ```
//!
//! One segment per direction is in flight at a time; the receiver tells a
//! fresh segment from a retransmission purely by the alternating ack bit.
//! That keeps retransmission trivially correct at the cost of throughput —
//! there is deliberately no window, pipelining, or congestion control.
//!
//! Each module has a single responsibility:
//! - [`segment`]    — wire format (serialise / deserialise)
//! - [`checksum`]   — optional one's-complement integrity layer
//! - [`socket`]     — async UDP socket abstraction
//! - [`channel`]    — synthetic loss + per-call deadlines
//! - [`sender`]     — stop-and-wait outbound state machine
//! - [`receiver`]   — inbound classification and duplicate suppression
//! - [`frame`]      — message chunking and fin-terminated reassembly
//! - [`connection`] — serialized dispatcher, drain task, public API

pub mod channel;
pub mod checksum;
pub mod connection;
pub mod frame;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod socket;

pub use connection::{Config, ConnError, Connection, Listener};
