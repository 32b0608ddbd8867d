//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between peers is a [`Segment`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`], returning errors
//!   for malformed or truncated input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Ack Bit            |        Sequence Number        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Checksum           |             Length            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Fin      |                   Payload ...                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 9 bytes.
//! ack_bit(2) + seq_num(2) + checksum(2) + length(2) + fin(1)
//!
//! The ack bit is semantically a single alternating bit but occupies a full
//! `u16` field for wire compatibility with the reference layout.

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 9;

// Byte offsets of each field within the serialised header.
const OFF_ACK_BIT: usize = 0;
const OFF_SEQ_NUM: usize = 2;
const OFF_CHECKSUM: usize = 4;
const OFF_LENGTH: usize = 6;
const OFF_FIN: usize = 8;

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`Segment::encode`] converts to big-endian
/// on the wire and [`Segment::decode`] converts back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Alternating acknowledgment bit (0 or 1) the receiver must echo back.
    pub ack_bit: u16,
    /// Per-direction segment counter.  Diagnostic only — correctness rests
    /// on `ack_bit`; wrap-around is not specially handled.
    pub seq_num: u16,
    /// Optional one's-complement checksum over the payload.
    ///
    /// Zero when the checksum layer is not engaged (the default).
    pub checksum: u16,
    /// Length of the payload in bytes.
    ///
    /// On encode this is computed from the actual payload length.
    /// On decode this is validated against the remaining buffer bytes.
    pub length: u16,
    /// 0 normally; 1 marks logical end-of-message.
    pub fin: u8,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    /// Build a data segment carrying `payload`.
    ///
    /// The checksum field is left at zero; callers engaging the optional
    /// checksum layer fill it via [`crate::checksum::checksum`].
    pub fn data(ack_bit: u16, seq_num: u16, fin: bool, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                ack_bit,
                seq_num,
                checksum: 0,
                length: payload.len() as u16,
                fin: u8::from(fin),
            },
            payload,
        }
    }

    /// Build a zero-length acknowledgment segment echoing `ack_bit`/`seq_num`.
    pub fn ack(ack_bit: u16, seq_num: u16) -> Self {
        Self::data(ack_bit, seq_num, false, Vec::new())
    }

    /// `true` when this segment marks logical end-of-message.
    pub fn is_fin(&self) -> bool {
        self.header.fin != 0
    }

    /// Serialise this segment into a newly allocated byte vector.
    ///
    /// `header.length` is computed from the actual payload; any value
    /// already stored in that field is ignored.
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = self.payload.len();
        let mut buf = vec![0u8; HEADER_LEN + payload_len];

        buf[OFF_ACK_BIT..OFF_ACK_BIT + 2].copy_from_slice(&self.header.ack_bit.to_be_bytes());
        buf[OFF_SEQ_NUM..OFF_SEQ_NUM + 2].copy_from_slice(&self.header.seq_num.to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&self.header.checksum.to_be_bytes());
        buf[OFF_LENGTH..OFF_LENGTH + 2].copy_from_slice(&(payload_len as u16).to_be_bytes());
        buf[OFF_FIN] = self.header.fin;

        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Segment`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`], or
    /// - the `length` field disagrees with the remaining bytes.
    ///
    /// The length check guarantees the invariant that a decoded segment's
    /// payload length always equals its `length` field.  The checksum field
    /// is *not* verified here — that is the caller's optional layer.
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::HeaderTooShort);
        }

        let ack_bit = u16::from_be_bytes([buf[OFF_ACK_BIT], buf[OFF_ACK_BIT + 1]]);
        let seq_num = u16::from_be_bytes([buf[OFF_SEQ_NUM], buf[OFF_SEQ_NUM + 1]]);
        let checksum = u16::from_be_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);
        let length = u16::from_be_bytes([buf[OFF_LENGTH], buf[OFF_LENGTH + 1]]);
        let fin = buf[OFF_FIN];

        if buf.len() != HEADER_LEN + length as usize {
            return Err(SegmentError::LengthMismatch);
        }

        Ok(Segment {
            header: Header {
                ack_bit,
                seq_num,
                checksum,
                length,
                fin,
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum SegmentError {
    /// Buffer shorter than the fixed header size.
    HeaderTooShort,
    /// `length` field does not match the actual remaining bytes.
    LengthMismatch,
}

impl std::fmt::Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentError::HeaderTooShort => write!(f, "buffer too short to contain a header"),
            SegmentError::LengthMismatch => {
                write!(f, "length field does not match remaining bytes")
            }
        }
    }
}

impl std::error::Error for SegmentError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let seg = Segment::data(1, 42, false, b"hello".to_vec());
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded.header.ack_bit, 1);
        assert_eq!(decoded.header.seq_num, 42);
        assert_eq!(decoded.header.length, 5);
        assert_eq!(decoded.header.fin, 0);
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn encode_sets_correct_length() {
        let seg = Segment::data(0, 7, false, b"world".to_vec());
        let bytes = seg.encode();
        let len_field = u16::from_be_bytes([bytes[OFF_LENGTH], bytes[OFF_LENGTH + 1]]);
        assert_eq!(len_field, 5);
        assert_eq!(bytes.len(), HEADER_LEN + 5);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Segment::decode(&[]), Err(SegmentError::HeaderTooShort));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Segment::decode(&[0u8; HEADER_LEN - 1]),
            Err(SegmentError::HeaderTooShort)
        );
    }

    #[test]
    fn decode_truncated_payload_returns_error() {
        let mut bytes = Segment::data(0, 0, false, b"data".to_vec()).encode();
        bytes.pop(); // length still claims 4 bytes, but buf is one short
        assert_eq!(Segment::decode(&bytes), Err(SegmentError::LengthMismatch));
    }

    #[test]
    fn decode_oversized_payload_returns_error() {
        let mut bytes = Segment::data(0, 0, false, b"data".to_vec()).encode();
        bytes.push(0xaa); // one byte more than the length field declares
        assert_eq!(Segment::decode(&bytes), Err(SegmentError::LengthMismatch));
    }

    #[test]
    fn fin_segment_roundtrip() {
        let seg = Segment::data(1, 3, true, Vec::new());
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert!(decoded.is_fin());
        assert_eq!(decoded.header.length, 0);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn ack_segment_is_zero_length() {
        let bytes = Segment::ack(1, 9).encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        let decoded = Segment::decode(&bytes).unwrap();
        assert_eq!(decoded.header.ack_bit, 1);
        assert_eq!(decoded.header.seq_num, 9);
        assert!(!decoded.is_fin());
    }

    #[test]
    fn header_len_constant_is_correct() {
        // ack_bit(2) + seq_num(2) + checksum(2) + length(2) + fin(1) = 9
        assert_eq!(HEADER_LEN, 9);
    }

    #[test]
    fn fields_big_endian_on_wire() {
        let mut seg = Segment::data(0x0102, 0x0304, false, Vec::new());
        seg.header.checksum = 0x0506;
        let bytes = seg.encode();
        assert_eq!(&bytes[OFF_ACK_BIT..OFF_ACK_BIT + 2], &[0x01, 0x02]);
        assert_eq!(&bytes[OFF_SEQ_NUM..OFF_SEQ_NUM + 2], &[0x03, 0x04]);
        assert_eq!(&bytes[OFF_CHECKSUM..OFF_CHECKSUM + 2], &[0x05, 0x06]);
    }

    #[test]
    fn decoded_payload_length_equals_length_field() {
        let seg = Segment::data(0, 1, false, vec![7u8; 33]);
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded.payload.len(), decoded.header.length as usize);
    }
}
