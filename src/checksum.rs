//! Optional Internet-checksum layer.
//!
//! The wire header reserves a 16-bit checksum field, but validating it is a
//! composable extra, not a core invariant of the protocol: reliability rests
//! entirely on the alternating ack bit. [`crate::connection::Config`] leaves
//! verification off by default; when enabled, a mismatch is treated exactly
//! like a malformed segment (re-ack current state, keep looping).
//!
//! The checksum itself is the classic one's-complement sum: add the data as
//! big-endian 16-bit words, fold the carry back into the low 16 bits, and
//! complement the result.  An odd trailing byte is added as its own
//! low-order word.

/// Compute the one's-complement checksum of `data`.
pub fn checksum(data: &[u8]) -> u16 {
    !fold(sum_words(data))
}

/// Verify `data` against a previously computed `checksum`.
///
/// The one's-complement sum of the data plus its complement checksum
/// saturates all 16 bits, so verification is a single addition — the same
/// trick used by IP/TCP/UDP checksum validation.
pub fn verify(data: &[u8], checksum: u16) -> bool {
    fold(sum_words(data) + u32::from(checksum)) == 0xffff
}

/// Sum `data` as big-endian 16-bit words into a 32-bit accumulator.
///
/// An odd trailing byte contributes its raw value (low-order word).
fn sum_words(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut i = 0;

    while i + 1 < data.len() {
        sum += u32::from(u16::from_be_bytes([data[i], data[i + 1]]));
        i += 2;
    }
    if i < data.len() {
        sum += u32::from(data[i]);
    }

    sum
}

/// Fold a 32-bit one's-complement accumulator into 16 bits.
fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(checksum(b""), 0xffff);
        assert_eq!(checksum(&[1]), 0xffff ^ 1);
        assert_eq!(checksum(&[0, 0, 0, 0, 0, 1]), 0xffff ^ 1);
        assert_eq!(checksum(&[0, 0, 0, 0, 1, 0]), 0xffff ^ (1 << 8));
    }

    #[test]
    fn verify_accepts_own_checksum() {
        for data in [
            &b""[..],
            b"a",
            b"ab",
            b"Hello world",
            b"the quick brown fox jumps over the lazy dog",
        ] {
            assert!(verify(data, checksum(data)), "data {data:?}");
        }
    }

    #[test]
    fn verify_rejects_wrong_checksum() {
        assert!(!verify(b"", 1));
        assert!(!verify(&[1], 0xffff));
        assert!(!verify(&[1, 0, 0, 0], 124));
        assert!(!verify(&[1, 1, 0], 17));
        assert!(!verify(b"Hello, world!", 6));
    }

    #[test]
    fn single_byte_mutation_detected() {
        let data = b"stop-and-wait checksum sample payload".to_vec();
        let sum = checksum(&data);

        for i in 0..data.len() {
            let mut corrupt = data.clone();
            corrupt[i] ^= 0x5a;
            assert!(
                !verify(&corrupt, sum),
                "mutation at byte {i} went undetected"
            );
        }
    }

    #[test]
    fn carry_is_folded() {
        // Two words of 0xffff overflow 16 bits; the carry must wrap around.
        let data = [0xff, 0xff, 0xff, 0xff];
        let sum = checksum(&data);
        assert!(verify(&data, sum));
    }
}
