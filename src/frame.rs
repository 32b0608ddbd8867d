//! Stream framing: chunking writes, reassembling reads.
//!
//! A logical message of arbitrary length becomes a sequence of data
//! segments no larger than the maximum segment size, terminated by one
//! zero-length segment with the fin flag set.  This module is pure —
//! [`crate::connection`] drives the actual exchanges.

/// Split `data` into `(chunk, fin)` pairs ready for transmission.
///
/// Every chunk is at most `max_segment_size` bytes with `fin = false`; the
/// final entry is always an empty `fin = true` marker, even for empty
/// `data`.
pub fn split(data: &[u8], max_segment_size: usize) -> Vec<(&[u8], bool)> {
    assert!(max_segment_size >= 1, "max_segment_size must be at least 1");
    let mut out: Vec<(&[u8], bool)> = data
        .chunks(max_segment_size)
        .map(|chunk| (chunk, false))
        .collect();
    out.push((&[], true));
    out
}

/// Accumulates delivered payloads into a caller-supplied buffer until the
/// buffer is full or the fin marker is observed.
///
/// The buffer size must be known to the caller in advance; it is not
/// negotiated on the wire.
#[derive(Debug)]
pub struct Assembler<'a> {
    buf: &'a mut [u8],
    filled: usize,
    fin_seen: bool,
}

impl<'a> Assembler<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            filled: 0,
            fin_seen: false,
        }
    }

    /// Fold one delivered segment into the buffer.
    ///
    /// Payload beyond the remaining buffer space is dropped.  Returns the
    /// number of bytes copied.
    pub fn push(&mut self, payload: &[u8], fin: bool) -> usize {
        let room = self.buf.len() - self.filled;
        let n = payload.len().min(room);
        self.buf[self.filled..self.filled + n].copy_from_slice(&payload[..n]);
        self.filled += n;
        if fin {
            self.fin_seen = true;
        }
        n
    }

    /// `true` once the message is complete: fin observed or buffer full.
    pub fn is_complete(&self) -> bool {
        self.fin_seen || self.filled == self.buf.len()
    }

    /// `true` when the buffer filled up before the fin marker arrived, so
    /// one more receive is needed to consume the trailing fin segment.
    pub fn fin_pending(&self) -> bool {
        !self.fin_seen
    }

    /// Total bytes copied into the buffer.
    pub fn filled(&self) -> usize {
        self.filled
    }
}
