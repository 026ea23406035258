//! Bounds-checked reader over a byte slice.

use super::{zigzag_decode32, zigzag_decode64, Tag, WireType, MAX_VARINT_LEN};
use crate::error::{Error, Result};
use bytes::Bytes;

/// A read position over an immutable byte slice.
///
/// Every `read_*` method either consumes exactly the bytes of the value it
/// returns, or fails and leaves the position where it was. Offsets reported
/// in errors are absolute: a cursor over a sub-slice carries the base offset
/// of that sub-slice in the enclosing input.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Creates a cursor over a sub-slice that begins at `base` in the enclosing input
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Re-targets the cursor at a new buffer
    pub fn reset(&mut self, data: &'a [u8]) {
        self.data = data;
        self.pos = 0;
        self.base = 0;
    }

    /// Absolute position of the next byte to read
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true once every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    fn eof(&self) -> Error {
        Error::unexpected_eof(self.position())
    }

    /// Decodes the varint at the current position without consuming it.
    ///
    /// Returns the value and its encoded length.
    fn peek_varint(&self) -> Result<(u64, usize)> {
        let buf = &self.data[self.pos..];

        match buf.first() {
            None => return Err(self.eof()),
            Some(&byte) if byte < 0x80 => return Ok((u64::from(byte), 1)),
            Some(_) => {}
        }

        let mut value: u64 = 0;
        for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
            // The tenth byte lands at shift 63, so only its lowest bit survives.
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte < 0x80 {
                return Ok((value, i + 1));
            }
        }

        if buf.len() >= MAX_VARINT_LEN {
            Err(Error::VarintOverflow {
                offset: self.position(),
            })
        } else {
            Err(self.eof())
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos.checked_add(N).ok_or_else(|| self.eof())?;
        let bytes: [u8; N] = self
            .data
            .get(self.pos..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| self.eof())?;
        self.pos = end;
        Ok(bytes)
    }

    /// Reads a base-128 varint
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, len) = self.peek_varint()?;
        self.pos += len;
        Ok(value)
    }

    /// Reads a field key and splits it into field number and wire type
    pub fn read_tag(&mut self) -> Result<Tag> {
        let offset = self.position();
        let (raw, len) = self.peek_varint()?;
        let tag = Tag::from_raw(raw, offset)?;
        self.pos += len;
        Ok(tag)
    }

    /// Reads a little-endian 32-bit value
    pub fn read_fixed32(&mut self) -> Result<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    /// Reads a little-endian 64-bit value
    pub fn read_fixed64(&mut self) -> Result<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    /// Reads a zigzag-encoded `sint32`
    pub fn read_zigzag32(&mut self) -> Result<i32> {
        self.read_varint().map(|n| zigzag_decode32(n as u32))
    }

    /// Reads a zigzag-encoded `sint64`
    pub fn read_zigzag64(&mut self) -> Result<i64> {
        self.read_varint().map(zigzag_decode64)
    }

    /// Reads a length-prefixed run and returns a view into the buffer
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8]> {
        let start = self.position();
        let (length, prefix_len) = self.peek_varint()?;

        let len = isize::try_from(length)
            .map(|n| n as usize)
            .map_err(|_| Error::malformed_length(start, length))?;
        let body = self.pos + prefix_len;
        let end = body
            .checked_add(len)
            .ok_or_else(|| Error::malformed_length(start, length))?;

        if end > self.data.len() {
            return Err(Error::unexpected_eof(start));
        }

        self.pos = end;
        Ok(&self.data[body..end])
    }

    /// Reads a length-prefixed run into an owned buffer
    pub fn read_length_delimited_owned(&mut self) -> Result<Bytes> {
        self.read_length_delimited().map(Bytes::copy_from_slice)
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// Invalid UTF-8 is rejected and the cursor stays put.
    pub fn read_str(&mut self) -> Result<&'a str> {
        let saved = self.pos;
        let offset = self.position();
        let raw = self.read_length_delimited()?;
        std::str::from_utf8(raw).map_err(|source| {
            self.pos = saved;
            Error::InvalidUtf8 { offset, source }
        })
    }

    /// Skips the value that follows `tag`.
    ///
    /// Groups are skipped up to their matching end marker, nesting at most
    /// `max_depth` groups deep.
    pub fn skip_field(&mut self, tag: Tag, max_depth: usize) -> Result<()> {
        let saved = self.pos;
        let result = self.skip_value(tag, 0, max_depth);
        if result.is_err() {
            self.pos = saved;
        }
        result
    }

    fn skip_value(&mut self, tag: Tag, depth: usize, max_depth: usize) -> Result<()> {
        match tag.wire_type {
            WireType::Varint => self.read_varint().map(drop),
            WireType::Fixed64 => self.read_fixed64().map(drop),
            WireType::Fixed32 => self.read_fixed32().map(drop),
            WireType::LengthDelimited => self.read_length_delimited().map(drop),
            WireType::StartGroup => {
                if depth >= max_depth {
                    return Err(Error::RecursionLimit {
                        offset: self.position(),
                        limit: max_depth,
                    });
                }
                loop {
                    let offset = self.position();
                    let inner = self.read_tag()?;
                    if inner.wire_type == WireType::EndGroup {
                        if inner.field_number == tag.field_number {
                            return Ok(());
                        }
                        return Err(Error::UnbalancedGroup {
                            offset,
                            depth: depth as isize + 1,
                        });
                    }
                    self.skip_value(inner, depth + 1, max_depth)?;
                }
            }
            WireType::EndGroup => Err(Error::UnbalancedGroup {
                offset: self.position(),
                depth: -1,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_varint(mut n: u64) -> Vec<u8> {
        let mut out = Vec::new();
        while n >= 0x80 {
            out.push((n as u8) | 0x80);
            n >>= 7;
        }
        out.push(n as u8);
        out
    }

    #[test]
    fn test_varint_single_byte() {
        let mut cursor = ByteCursor::new(&[0x08]);
        assert_eq!(cursor.read_varint().unwrap(), 8);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_varint_multi_byte() {
        let mut cursor = ByteCursor::new(&[0xAC, 0x02]);
        assert_eq!(cursor.read_varint().unwrap(), 300);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_varint_max() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_varint().unwrap(), u64::MAX);
        assert_eq!(cursor.position(), 10);
    }

    #[test]
    fn test_varint_round_trip() {
        let samples = [
            0,
            1,
            127,
            128,
            300,
            16_383,
            16_384,
            u32::MAX as u64,
            1 << 35,
            (1 << 63) - 1,
            1 << 63,
            u64::MAX,
        ];
        for n in samples {
            let encoded = encode_varint(n);
            let mut cursor = ByteCursor::new(&encoded);
            assert_eq!(cursor.read_varint().unwrap(), n, "value {n}");
            assert!(cursor.is_empty());

            // Same value with trailing bytes takes the long-buffer path.
            let mut padded = encoded.clone();
            padded.extend_from_slice(&[0xAA; 12]);
            let mut cursor = ByteCursor::new(&padded);
            assert_eq!(cursor.read_varint().unwrap(), n, "padded value {n}");
            assert_eq!(cursor.position(), encoded.len());
        }
    }

    #[test]
    fn test_tenth_byte_contributes_one_bit() {
        let data = [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7F];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_varint().unwrap(), 1 << 63);
    }

    #[test]
    fn test_varint_truncated() {
        for n in [128u64, 300, u64::MAX] {
            let encoded = encode_varint(n);
            let truncated = &encoded[..encoded.len() - 1];
            let mut cursor = ByteCursor::new(truncated);
            assert!(matches!(
                cursor.read_varint(),
                Err(Error::UnexpectedEof { offset: 0 })
            ));
            assert_eq!(cursor.position(), 0);
        }
        assert!(ByteCursor::new(&[]).read_varint().is_err());
    }

    #[test]
    fn test_varint_overflow() {
        let data = [0xFF; 11];
        let mut cursor = ByteCursor::new(&data);
        assert!(matches!(
            cursor.read_varint(),
            Err(Error::VarintOverflow { offset: 0 })
        ));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_fixed_reads() {
        let data = [0x00, 0x00, 0x80, 0x3F, 0, 0, 0, 0, 0, 0, 0x10, 0x40];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(f32::from_bits(cursor.read_fixed32().unwrap()), 1.0);
        assert_eq!(f64::from_bits(cursor.read_fixed64().unwrap()), 4.0);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_fixed_short_buffer_does_not_advance() {
        let mut cursor = ByteCursor::new(&[1, 2, 3]);
        assert!(matches!(
            cursor.read_fixed32(),
            Err(Error::UnexpectedEof { .. })
        ));
        assert!(cursor.read_fixed64().is_err());
        assert_eq!(cursor.remaining(), 3);
    }

    #[test]
    fn test_zigzag_reads() {
        let mut cursor = ByteCursor::new(&[0x03, 0x04, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(cursor.read_zigzag32().unwrap(), -2);
        assert_eq!(cursor.read_zigzag64().unwrap(), 2);
        assert_eq!(cursor.read_zigzag32().unwrap(), i32::MIN);
    }

    #[test]
    fn test_length_delimited() {
        let data = [0x04, b'h', b'a', b'h', b'a', 0x00];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_length_delimited().unwrap(), b"haha");
        assert_eq!(cursor.read_length_delimited_owned().unwrap().len(), 0);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_length_delimited_past_end() {
        for declared in [5u64, 6, 1000, u32::MAX as u64] {
            let mut data = encode_varint(declared);
            data.extend_from_slice(b"haha");
            let mut cursor = ByteCursor::new(&data);
            assert!(
                matches!(
                    cursor.read_length_delimited(),
                    Err(Error::UnexpectedEof { offset: 0 })
                ),
                "declared {declared}"
            );
            assert_eq!(cursor.position(), 0);
        }
    }

    #[test]
    fn test_length_delimited_negative_length() {
        let data = encode_varint(u64::MAX);
        let mut cursor = ByteCursor::new(&data);
        assert!(matches!(
            cursor.read_length_delimited(),
            Err(Error::MalformedLength { .. })
        ));
    }

    #[test]
    fn test_read_str_rejects_invalid_utf8() {
        let mut cursor = ByteCursor::new(&[0x02, 0xC3, 0x28]);
        assert!(matches!(
            cursor.read_str(),
            Err(Error::InvalidUtf8 { offset: 0, .. })
        ));
        assert_eq!(cursor.position(), 0);

        cursor.reset(&[0x02, b'o', b'k']);
        assert_eq!(cursor.read_str().unwrap(), "ok");
    }

    #[test]
    fn test_base_offset_in_errors() {
        let mut cursor = ByteCursor::with_base(&[0x80], 40);
        assert!(matches!(
            cursor.read_varint(),
            Err(Error::UnexpectedEof { offset: 40 })
        ));
    }

    #[test]
    fn test_read_tag_unknown_wire_type() {
        let mut cursor = ByteCursor::new(&[0x0E]);
        assert!(matches!(
            cursor.read_tag(),
            Err(Error::UnknownWireType { wire_type: 6, .. })
        ));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_skip_group() {
        // start(1) { varint(2)=1, start(3) { } end(3) } end(1), then varint(4)=9
        let data = [0x0B, 0x10, 0x01, 0x1B, 0x1C, 0x0C, 0x20, 0x09];
        let mut cursor = ByteCursor::new(&data);
        let tag = cursor.read_tag().unwrap();
        cursor.skip_field(tag, 10).unwrap();
        let next = cursor.read_tag().unwrap();
        assert_eq!(next.field_number, 4);
        assert_eq!(cursor.read_varint().unwrap(), 9);
    }

    #[test]
    fn test_skip_unterminated_group_restores_position() {
        let data = [0x0B, 0x10, 0x01];
        let mut cursor = ByteCursor::new(&data);
        let tag = cursor.read_tag().unwrap();
        assert!(cursor.skip_field(tag, 10).is_err());
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_skip_group_depth_limit() {
        let data = [0x0B, 0x0B, 0x0B, 0x0C, 0x0C, 0x0C];
        let mut cursor = ByteCursor::new(&data);
        let tag = cursor.read_tag().unwrap();
        assert!(matches!(
            cursor.skip_field(tag, 2),
            Err(Error::RecursionLimit { limit: 2, .. })
        ));
    }
}
