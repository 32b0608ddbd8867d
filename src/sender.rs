//! Stop-and-wait send-side state machine.
//!
//! [`SawSender`] owns the outbound half of a connection's protocol state:
//! the alternating ack bit and the per-direction segment counter.
//!
//! # Protocol contract
//!
//! - At most **one** segment is in flight at any moment.
//! - [`advance`] toggles the ack bit and increments the counter **before**
//!   the first transmission attempt for a payload.
//! - An acknowledgment completes the exchange only when it echoes both the
//!   current bit and the current counter; anything else is a stale ack for a
//!   superseded exchange and the original segment is retransmitted.
//! - The counter is diagnostic: duplicate detection rests on the bit alone,
//!   so wrap-around needs no special handling.
//!
//! This module only manages state; all socket I/O is driven by
//! [`crate::connection`].
//!
//! [`advance`]: SawSender::advance

use crate::segment::Segment;

/// Toggle an alternating bit stored as a `u16` wire field.
#[inline]
pub(crate) fn toggle(bit: u16) -> u16 {
    debug_assert!(bit <= 1, "ack bit out of range: {bit}");
    1 - bit
}

/// Send-side state for one direction of a connection.
#[derive(Debug)]
pub struct SawSender {
    /// Bit the peer must echo to acknowledge the current segment.
    pub ack_bit: u16,
    /// Counter of segments sent in this direction (wrapping).
    pub seq_num: u16,
}

impl Default for SawSender {
    fn default() -> Self {
        Self::new()
    }
}

impl SawSender {
    pub fn new() -> Self {
        Self {
            ack_bit: 0,
            seq_num: 0,
        }
    }

    /// Begin a new exchange: toggle the ack bit and bump the counter.
    ///
    /// Must be called exactly once per payload, before the first
    /// transmission attempt.  Retransmissions reuse the same state.
    pub fn advance(&mut self) {
        self.ack_bit = toggle(self.ack_bit);
        self.seq_num = self.seq_num.wrapping_add(1);
    }

    /// Build the segment for the current exchange.
    ///
    /// Identical bytes are produced for every retransmission attempt until
    /// [`advance`](Self::advance) starts the next exchange.
    pub fn build_segment(&self, payload: Vec<u8>, fin: bool, with_checksum: bool) -> Segment {
        let mut seg = Segment::data(self.ack_bit, self.seq_num, fin, payload);
        if with_checksum {
            seg.header.checksum = crate::checksum::checksum(&seg.payload);
        }
        seg
    }

    /// `true` when `ack` acknowledges the current in-flight segment.
    ///
    /// A mismatched bit or counter means the ack belongs to a stale or
    /// duplicate exchange and the in-flight segment must be resent.
    pub fn matches_ack(&self, ack: &Segment) -> bool {
        ack.header.ack_bit == self.ack_bit && ack.header.seq_num == self.seq_num
    }
}
