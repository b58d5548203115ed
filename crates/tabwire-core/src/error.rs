//! Error types for the tabwire-core library.
//!
//! This module provides the decode-failure taxonomy using the `thiserror`
//! crate. Size and pack operations on a well-formed in-memory message never
//! fail, so every variant here describes a way `unpack` can reject its input
//! or run out of memory.

use thiserror::Error;

/// Result type alias for tabwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Decode failure raised by the unpack engine.
///
/// Malformed-input variants mean the buffer cannot be a valid encoding for
/// *any* descriptor; [`Error::OutOfMemory`] means the caller-supplied
/// allocator refused an allocation mid-decode (after which the partial
/// message has been fully released).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The buffer ended before a field's payload did
    #[error("truncated input at offset {offset}: need {needed} bytes, have {available}")]
    Truncated {
        /// Byte offset of the payload that ran short
        offset: usize,
        /// Bytes the wire format requires at this point
        needed: usize,
        /// Bytes actually remaining
        available: usize,
    },

    /// A varint ran past its 10-byte ceiling without terminating
    #[error("malformed varint at offset {offset}: no terminator within 10 bytes")]
    VarintOverflow {
        /// Byte offset where the varint starts
        offset: usize,
    },

    /// A length delimiter did not fit the 32-bit length domain
    ///
    /// Over-long encodings are rejected rather than truncated so that a
    /// length-based allocation can never overflow and under-allocate.
    #[error("length delimiter at offset {offset} exceeds 32 bits")]
    OversizedLength {
        /// Byte offset where the length varint starts
        offset: usize,
    },

    /// A tag carried a wire type this codec does not support (groups)
    #[error("unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType {
        /// The raw 3-bit wire type value
        wire_type: u8,
        /// Byte offset of the tag
        offset: usize,
    },

    /// A tag carried a field number outside 1..=2^29-1
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u32,
        /// Maximum valid field number
        max: u32,
    },

    /// A packed fixed-width payload was not a multiple of the element size
    #[error("packed payload of {len} bytes is not a multiple of {elem_size} for field '{field}'")]
    MisalignedPackedData {
        /// Name of the repeated field
        field: &'static str,
        /// Payload length in bytes
        len: usize,
        /// Fixed element size (4 or 8)
        elem_size: usize,
    },

    /// A string field held bytes that are not valid UTF-8
    #[error("field '{field}' is not valid UTF-8")]
    InvalidUtf8 {
        /// Name of the string field
        field: &'static str,
    },

    /// The allocator refused an allocation mid-decode
    #[error("allocator refused {requested} bytes")]
    OutOfMemory {
        /// Size of the refused allocation
        requested: usize,
    },
}

impl Error {
    /// Creates a new truncation error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::Truncated {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new varint overflow error
    pub fn varint_overflow(offset: usize) -> Self {
        Self::VarintOverflow { offset }
    }

    /// Creates a new oversized length delimiter error
    pub fn oversized_length(offset: usize) -> Self {
        Self::OversizedLength { offset }
    }

    /// Creates a new out-of-memory error
    pub fn out_of_memory(requested: usize) -> Self {
        Self::OutOfMemory { requested }
    }

    /// Returns true if this failure came from the allocator rather than
    /// from the input bytes
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}
