//! Protobuf wire primitives.
//!
//! Varints are little-endian base-128: byte `i` contributes `(b & 0x7F) << 7*i`
//! and the high bit marks continuation. A tag is `(field_number << 3) | wire_type`.
//!
//! # Example
//!
//! ```
//! use protowire::codec::{decode_varint, encode_varint};
//!
//! let mut buf = Vec::new();
//! encode_varint(300, &mut buf);
//! assert_eq!(buf, [0xAC, 0x02]);
//! assert_eq!(decode_varint(&buf).unwrap(), (300, 2));
//! ```

use bytes::BufMut;

use super::decode::RECURSION_LIMIT;
use crate::error::WireError;

/// Maximum encoded size of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Largest legal field number.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Wire type carried in the low three bits of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            other => Err(WireError::InvalidWireType(other)),
        }
    }
}

/// Append `value` as a varint.
pub fn encode_varint<B: BufMut>(mut value: u64, buf: &mut B) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Decode a varint from the start of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), WireError> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(WireError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        return Err(WireError::VarintOverflow);
    }
    Err(WireError::Truncated {
        position: buf.len(),
        needed: 1,
        length: buf.len(),
    })
}

/// Number of bytes `value` occupies as a varint.
pub fn encoded_len_varint(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

#[inline]
pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

#[inline]
pub fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Append a field tag.
#[inline]
pub fn encode_tag<B: BufMut>(field_number: u32, wire_type: WireType, buf: &mut B) {
    encode_varint((u64::from(field_number) << 3) | wire_type as u64, buf);
}

/// Cursor over an encoded message.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(needed)
            .filter(|end| *end <= self.buf.len())
            .ok_or(WireError::Truncated {
                position: self.pos,
                needed,
                length: self.buf.len(),
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64, WireError> {
        let (value, consumed) = decode_varint(&self.buf[self.pos..]).map_err(|e| match e {
            WireError::Truncated { .. } => WireError::Truncated {
                position: self.buf.len(),
                needed: 1,
                length: self.buf.len(),
            },
            other => other,
        })?;
        self.pos += consumed;
        Ok(value)
    }

    pub(crate) fn read_fixed32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_fixed64(&mut self) -> Result<u64, WireError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a varint length followed by that many bytes.
    pub(crate) fn read_length_delimited(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| WireError::Truncated {
            position: self.pos,
            needed: usize::MAX,
            length: self.buf.len(),
        })?;
        self.take(len)
    }

    /// Read a tag, returning field number and wire type.
    pub(crate) fn read_tag(&mut self) -> Result<(u32, WireType), WireError> {
        let tag = self.read_varint()?;
        let wire_type = WireType::try_from((tag & 0x7) as u8)?;
        let field_number = (tag >> 3) as u32;
        if field_number == 0 {
            return Err(WireError::FieldNumberZero);
        }
        Ok((field_number, wire_type))
    }

    /// Skip the value of an unknown field.
    ///
    /// `depth` is the nesting level of the enclosing message; each group
    /// entered counts as one more level against [`RECURSION_LIMIT`].
    pub(crate) fn skip(&mut self, wire_type: WireType, depth: usize) -> Result<(), WireError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8)?;
            }
            WireType::LengthDelimited => {
                self.read_length_delimited()?;
            }
            WireType::Fixed32 => {
                self.take(4)?;
            }
            WireType::StartGroup => {
                if depth >= RECURSION_LIMIT {
                    return Err(WireError::RecursionLimit);
                }
                loop {
                    let (_, inner) = self.read_tag()?;
                    if inner == WireType::EndGroup {
                        break;
                    }
                    self.skip(inner, depth + 1)?;
                }
            }
            WireType::EndGroup => return Err(WireError::UnexpectedEndGroup),
        }
        Ok(())
    }
}
