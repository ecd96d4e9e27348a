//! Variable-length integer encoding utilities.
//!
//! Seven bits per byte with a continuation bit, least significant group
//! first. Used for document ids, position deltas and lengths inside
//! segment files.

use crate::error::{FiledexError, Result};

/// Maximum encoded length of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN);
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        bytes.push(byte);

        if val == 0 {
            break;
        }
    }

    bytes
}

/// Decode a u64 value from the start of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;

    for (idx, &byte) in bytes.iter().enumerate() {
        if shift >= 64 {
            return Err(FiledexError::serialization("varint overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, idx + 1));
        }

        shift += 7;
    }

    Err(FiledexError::serialization("incomplete varint"))
}
