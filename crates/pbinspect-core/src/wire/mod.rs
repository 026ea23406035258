//! Low-level protobuf wire format primitives.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: start and end group (deprecated)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! All reading goes through [`ByteCursor`], which never panics on short or
//! malicious input.

mod cursor;

use crate::error::{Error, Result};

pub use cursor::ByteCursor;

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u64 = 536_870_911;

/// Maximum encoded length of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    Fixed64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    LengthDelimited = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    Fixed32 = 5,
}

impl WireType {
    /// Maps the low three tag bits to a wire type
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// A decoded field key: field number plus wire type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Field number (high bits of the key)
    pub field_number: u64,
    /// Wire type (low three bits of the key)
    pub wire_type: WireType,
}

impl Tag {
    /// Splits a raw key varint read at `offset` into its parts
    pub fn from_raw(raw: u64, offset: usize) -> Result<Self> {
        let field_number = raw >> 3;
        let bits = (raw & 0x07) as u8;
        let wire_type = WireType::from_bits(bits).ok_or(Error::UnknownWireType {
            offset,
            field_number,
            wire_type: bits,
        })?;
        Ok(Self {
            field_number,
            wire_type,
        })
    }
}

/// Undo the zigzag mapping of a 32-bit signed value
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Undo the zigzag mapping of a 64-bit signed value
pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
