//! Low-level protobuf wire format framing.
//!
//! Each field on the wire is a varint "tag" carrying the field number and
//! wire type, followed by a payload whose framing depends on the wire type:
//!
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! Wire types 3 and 4 (groups) are deprecated and unsupported; the unpack
//! engine rejects them as malformed input.

pub mod varint;

use crate::error::{Error, Result};

use bytes::BufMut;

pub use varint::{
    decode_varint, encode_varint, put_varint, varint_size, zigzag_decode32, zigzag_decode64,
    zigzag_encode32, zigzag_encode64, MAX_VARINT_LEN,
};

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated, unsupported)
    StartGroup = 3,
    /// End group (deprecated, unsupported)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl WireType {
    /// Returns true for the group markers this codec rejects
    pub fn is_group(self) -> bool {
        matches!(self, WireType::StartGroup | WireType::EndGroup)
    }
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::UnsupportedWireType {
                wire_type: value,
                offset: 0,
            }),
        }
    }
}

/// Returns the encoded size of the tag for `number`, any wire type.
///
/// The wire type lives in the low 3 bits and never changes the varint
/// length, so only the field number matters.
pub fn tag_size(number: u32) -> usize {
    varint_size(u64::from(number) << 3)
}

/// Append the tag varint for `(number, wire_type)` to a byte sink.
pub fn put_tag(out: &mut impl BufMut, number: u32, wire_type: WireType) {
    put_varint(out, (u64::from(number) << 3) | u64::from(wire_type as u8));
}

/// Decode a tag varint from the front of `data`.
///
/// Returns the field number, wire type, and bytes consumed. The field
/// number is validated against [`MAX_FIELD_NUMBER`]; unknown wire type
/// bit patterns cannot occur (all 3-bit values are named), but group
/// markers are passed through for the caller to reject.
pub fn decode_tag(data: &[u8]) -> Result<(u32, WireType, usize)> {
    let (tag, used) = decode_varint(data)?;
    let wire_type = WireType::try_from((tag & 0x07) as u8)?;
    let number = tag >> 3;

    if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
        return Err(Error::InvalidFieldNumber {
            number: number as u32,
            max: MAX_FIELD_NUMBER,
        });
    }

    Ok((number as u32, wire_type, used))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::try_from(0).unwrap(), WireType::Varint);
        assert_eq!(WireType::try_from(1).unwrap(), WireType::I64);
        assert_eq!(WireType::try_from(2).unwrap(), WireType::Len);
        assert_eq!(WireType::try_from(5).unwrap(), WireType::I32);
        assert!(WireType::try_from(6).is_err());
    }

    #[test]
    fn test_tag_size() {
        assert_eq!(tag_size(1), 1);
        assert_eq!(tag_size(15), 1);
        assert_eq!(tag_size(16), 2);
        assert_eq!(tag_size(2047), 2);
        assert_eq!(tag_size(2048), 3);
        assert_eq!(tag_size(MAX_FIELD_NUMBER), 5);
    }

    #[test]
    fn test_tag_roundtrip() {
        let mut buf = Vec::new();
        put_tag(&mut buf, 150, WireType::Len);
        let (number, wire_type, used) = decode_tag(&buf).unwrap();
        assert_eq!(number, 150);
        assert_eq!(wire_type, WireType::Len);
        assert_eq!(used, buf.len());
    }

    #[test]
    fn test_decode_tag_field_zero() {
        // Field 0 is invalid
        assert!(decode_tag(&[0x00]).is_err());
    }

    #[test]
    fn test_decode_tag_group_passthrough() {
        // (1 << 3) | 3 = start group; decode succeeds, caller rejects
        let (number, wire_type, _) = decode_tag(&[0x0b]).unwrap();
        assert_eq!(number, 1);
        assert!(wire_type.is_group());
    }
}
