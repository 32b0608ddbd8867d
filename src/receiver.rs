//! Stop-and-wait receive-side state machine.
//!
//! [`SawReceiver`] classifies each structurally valid inbound segment into
//! one of three verdicts:
//!
//! - [`Verdict::Accept`] — the segment carries the expected next bit and
//!   counter.  State advances, the payload is delivered to the application
//!   exactly once, and an acknowledgment for the **new** state goes out.
//! - [`Verdict::Duplicate`] — the segment matches a cached
//!   `(seq_num → ack_bit)` entry, meaning our earlier acknowledgment was
//!   lost and the peer retransmitted.  The cached acknowledgment is re-sent
//!   without re-delivering the payload (duplicate suppression).
//! - [`Verdict::Unexpected`] — neither of the above; the segment is
//!   discarded and the acknowledgment for the current, unchanged state is
//!   repeated.
//!
//! This module only manages state; all socket I/O is driven by
//! [`crate::connection`].

use std::collections::HashMap;

use crate::segment::Segment;
use crate::sender::toggle;

/// Classification of an inbound segment against receiver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New in-sequence data: deliver payload, advance state, ack new state.
    Accept,
    /// Retransmission of an already-accepted segment: re-send cached ack only.
    Duplicate,
    /// Out-of-turn segment: discard, re-send current ack.
    Unexpected,
}

/// Receive-side state for one direction of a connection.
#[derive(Debug, Default)]
pub struct SawReceiver {
    /// Bit of the most recently accepted segment.
    pub ack_bit: u16,
    /// Counter of the most recently accepted segment (wrapping).
    pub seq_num: u16,
    /// Ack bit sent for each accepted sequence number, kept so a
    /// retransmitted segment can be re-acknowledged without re-delivery.
    last_acks: HashMap<u16, u16>,
}

impl SawReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `seg` against the expected next state.
    pub fn classify(&self, seg: &Segment) -> Verdict {
        let expected_bit = toggle(self.ack_bit);
        let expected_seq = self.seq_num.wrapping_add(1);

        if seg.header.ack_bit == expected_bit && seg.header.seq_num == expected_seq {
            Verdict::Accept
        } else if self.last_acks.get(&seg.header.seq_num) == Some(&seg.header.ack_bit) {
            Verdict::Duplicate
        } else {
            Verdict::Unexpected
        }
    }

    /// Advance state past an accepted segment and cache its acknowledgment.
    ///
    /// Call only after [`classify`](Self::classify) returned
    /// [`Verdict::Accept`]; the toggle must happen exactly once per accepted
    /// segment.
    pub fn accept(&mut self, seg: &Segment) {
        debug_assert_eq!(self.classify(seg), Verdict::Accept);
        self.ack_bit = toggle(self.ack_bit);
        self.seq_num = self.seq_num.wrapping_add(1);
        self.last_acks.insert(self.seq_num, self.ack_bit);
    }

    /// Acknowledgment for the current state.
    ///
    /// Sent after every accepted segment, and repeated verbatim for
    /// timeouts and out-of-turn segments (the peer resolves lost acks by
    /// retrying).
    pub fn current_ack(&self) -> Segment {
        Segment::ack(self.ack_bit, self.seq_num)
    }

    /// Cached acknowledgment for an already-accepted sequence number.
    pub fn cached_ack(&self, seq_num: u16) -> Option<Segment> {
        self.last_acks
            .get(&seq_num)
            .map(|&bit| Segment::ack(bit, seq_num))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(bit: u16, seq: u16, payload: &[u8]) -> Segment {
        Segment::data(bit, seq, false, payload.to_vec())
    }

    #[test]
    fn initial_state_acks_zero() {
        let r = SawReceiver::new();
        let ack = r.current_ack();
        assert_eq!(ack.header.ack_bit, 0);
        assert_eq!(ack.header.seq_num, 0);
    }

    #[test]
    fn in_sequence_segment_accepted() {
        let mut r = SawReceiver::new();
        let seg = data(1, 1, b"hello");
        assert_eq!(r.classify(&seg), Verdict::Accept);

        r.accept(&seg);
        assert_eq!((r.ack_bit, r.seq_num), (1, 1));
        // Acknowledgment now reflects the new state.
        assert_eq!(r.current_ack(), Segment::ack(1, 1));
    }

    #[test]
    fn bit_toggles_exactly_once_per_accepted_segment() {
        let mut r = SawReceiver::new();
        for (bit, seq) in [(1u16, 1u16), (0, 2), (1, 3), (0, 4)] {
            let seg = data(bit, seq, b"x");
            assert_eq!(r.classify(&seg), Verdict::Accept, "seq {seq}");
            r.accept(&seg);
            assert_eq!((r.ack_bit, r.seq_num), (bit, seq));
        }
    }

    #[test]
    fn retransmission_is_duplicate_not_accept() {
        let mut r = SawReceiver::new();
        let seg = data(1, 1, b"hello");
        r.accept(&seg);

        // Peer never saw our ack and retransmits the same segment.
        assert_eq!(r.classify(&seg), Verdict::Duplicate);
        // The cached ack equals what we originally sent.
        assert_eq!(r.cached_ack(1), Some(Segment::ack(1, 1)));
        // State must not have advanced again.
        assert_eq!((r.ack_bit, r.seq_num), (1, 1));
    }

    #[test]
    fn duplicate_of_older_segment_still_recognised() {
        let mut r = SawReceiver::new();
        r.accept(&data(1, 1, b"a"));
        r.accept(&data(0, 2, b"b"));

        assert_eq!(r.classify(&data(1, 1, b"a")), Verdict::Duplicate);
        assert_eq!(r.cached_ack(1), Some(Segment::ack(1, 1)));
    }

    #[test]
    fn out_of_turn_segment_unexpected() {
        let r = SawReceiver::new();
        // Wrong bit for the expected counter.
        assert_eq!(r.classify(&data(0, 1, b"x")), Verdict::Unexpected);
        // Counter from the future.
        assert_eq!(r.classify(&data(1, 5, b"x")), Verdict::Unexpected);
    }

    #[test]
    fn unexpected_segment_leaves_ack_unchanged() {
        let mut r = SawReceiver::new();
        r.accept(&data(1, 1, b"a"));

        let before = r.current_ack();
        assert_eq!(r.classify(&data(0, 7, b"zz")), Verdict::Unexpected);
        assert_eq!(r.current_ack(), before);
    }

    #[test]
    fn cached_ack_unknown_seq_is_none() {
        let r = SawReceiver::new();
        assert_eq!(r.cached_ack(3), None);
    }
}
