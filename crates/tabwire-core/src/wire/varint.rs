//! Base-128 varint encoding and the zigzag transform.
//!
//! Varints are little-endian groups of 7 bits with the continuation bit
//! (0x80) set on every byte but the last. Encodings are canonical: no
//! padding bytes are emitted, and a 64-bit value never takes more than
//! 10 bytes.

use crate::error::{Error, Result};

use bytes::BufMut;

/// Maximum encoded length of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Return the number of bytes the base-128 encoding of `value` occupies.
pub const fn varint_size(value: u64) -> usize {
    // 1 byte per started 7-bit group; zero still takes one byte.
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0xfff_ffff => 4,
        0x1000_0000..=0x7_ffff_ffff => 5,
        0x8_0000_0000..=0x3ff_ffff_ffff => 6,
        0x400_0000_0000..=0x1_ffff_ffff_ffff => 7,
        0x2_0000_0000_0000..=0xff_ffff_ffff_ffff => 8,
        0x100_0000_0000_0000..=0x7fff_ffff_ffff_ffff => 9,
        _ => 10,
    }
}

/// Encode `value` into a fixed buffer; returns the buffer and bytes used.
pub fn encode_varint(mut value: u64) -> ([u8; MAX_VARINT_LEN], usize) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut i = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        buf[i] = if value == 0 { byte } else { byte | 0x80 };
        i += 1;
        if value == 0 {
            return (buf, i);
        }
    }
}

/// Append the base-128 encoding of `value` to a byte sink.
pub fn put_varint(out: &mut impl BufMut, value: u64) {
    let (buf, len) = encode_varint(value);
    out.put_slice(&buf[..len]);
}

/// Decode a varint from the front of `data`.
///
/// Returns the decoded value and the number of bytes consumed. Offsets in
/// the returned errors are relative to the start of `data`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            // Varints are at most 10 bytes for a 64-bit value
            return Err(Error::varint_overflow(0));
        }

        result |= ((byte & 0x7f) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::truncated(0, data.len() + 1, data.len()))
}

/// Zigzag-map a signed 32-bit integer to unsigned: `n >= 0 ? 2n : -2n-1`.
pub const fn zigzag_encode32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

/// Inverse of [`zigzag_encode32`].
pub const fn zigzag_decode32(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

/// Zigzag-map a signed 64-bit integer to unsigned.
pub const fn zigzag_encode64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// Inverse of [`zigzag_encode64`].
pub const fn zigzag_decode64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_size_boundaries() {
        let cases: &[(u64, usize)] = &[
            (0, 1),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (2_097_151, 3),
            (2_097_152, 4),
            (268_435_455, 4),
            (268_435_456, 5),
            (u64::from(u32::MAX), 5),
            (u64::MAX, 10),
        ];
        for &(value, expected) in cases {
            assert_eq!(varint_size(value), expected, "size of {}", value);
            let (_, len) = encode_varint(value);
            assert_eq!(len, expected, "encoded length of {}", value);
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for &value in &[0u64, 1, 150, 300, 1 << 21, u64::from(u32::MAX), u64::MAX] {
            let (buf, len) = encode_varint(value);
            let (decoded, used) = decode_varint(&buf[..len]).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(used, len);
        }
    }

    #[test]
    fn test_decode_varint_multi_byte() {
        let data = [0xac, 0x02]; // 300
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 300);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_decode_varint_max() {
        let data = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, u64::MAX);
        assert_eq!(len, 10);
    }

    #[test]
    fn test_decode_varint_unterminated() {
        // 11 continuation bytes: past the 64-bit ceiling
        let data = [0x80u8; 11];
        assert!(decode_varint(&data).is_err());
        // Truncated: continuation bit set on the final available byte
        assert!(decode_varint(&[0x80]).is_err());
    }

    #[test]
    fn test_zigzag32() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(-2), 3);
        assert_eq!(zigzag_encode32(i32::MAX), u32::MAX - 1);
        assert_eq!(zigzag_encode32(i32::MIN), u32::MAX);
        for v in [-300, -1, 0, 1, 300, i32::MIN, i32::MAX] {
            assert_eq!(zigzag_decode32(zigzag_encode32(v)), v);
        }
    }

    #[test]
    fn test_zigzag64() {
        assert_eq!(zigzag_encode64(-1), 1);
        assert_eq!(zigzag_encode64(i64::MIN), u64::MAX);
        for v in [-300, -1, 0, 1, 300, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode64(zigzag_encode64(v)), v);
        }
    }
}
