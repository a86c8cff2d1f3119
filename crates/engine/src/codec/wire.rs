//! Protobuf wire primitives on top of the `protobuf` crate's coded streams.
//!
//! Tag layout: `(field_number << 3) | wire_type`.
//! Wire types: 0=varint, 1=64-bit, 2=length-delimited, 3/4=group (legacy),
//! 5=32-bit.

use protobuf::{CodedInputStream, CodedOutputStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
}

impl WireType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => WireType::Varint,
            1 => WireType::Fixed64,
            2 => WireType::LengthDelimited,
            3 => WireType::StartGroup,
            4 => WireType::EndGroup,
            5 => WireType::Fixed32,
            _ => return None,
        })
    }

    pub fn raw(self) -> u32 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::LengthDelimited => 2,
            WireType::StartGroup => 3,
            WireType::EndGroup => 4,
            WireType::Fixed32 => 5,
        }
    }
}

/// Low-level read failures, turned into `DecodeError`s by the decoder once
/// the message context is known.
#[derive(Debug, Clone, PartialEq)]
pub enum WireError {
    Stream(String),
    InvalidTag(u32),
    InvalidWireType { field_number: u32, wire_type: u32 },
    LengthOutOfBounds { length: u64, remaining: u64 },
    UnmatchedEndGroup(u32),
    GroupTooDeep { limit: usize },
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Stream(detail) => write!(f, "{detail}"),
            WireError::InvalidTag(tag) => write!(f, "invalid tag {tag}"),
            WireError::InvalidWireType {
                field_number,
                wire_type,
            } => write!(f, "invalid wire type {wire_type} for field {field_number}"),
            WireError::LengthOutOfBounds { length, remaining } => {
                write!(f, "length {length} exceeds the {remaining} remaining bytes")
            }
            WireError::UnmatchedEndGroup(number) => {
                write!(f, "end-group tag for field {number} without a matching start")
            }
            WireError::GroupTooDeep { limit } => {
                write!(f, "groups nested deeper than {limit} levels")
            }
        }
    }
}

impl From<protobuf::Error> for WireError {
    fn from(e: protobuf::Error) -> Self {
        WireError::Stream(e.to_string())
    }
}

/// Nesting limit for unknown groups being skipped.
pub const MAX_GROUP_DEPTH: usize = 100;

pub type WireResult<T> = std::result::Result<T, WireError>;

pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

pub fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Appends `value` as a base-128 varint.
pub fn push_varint(buffer: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buffer.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buffer.push(value as u8);
}

/// Bounds-checked reader over one message's bytes.
pub struct WireReader<'a> {
    stream: CodedInputStream<'a>,
    len: u64,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            stream: CodedInputStream::from_bytes(data),
            len: data.len() as u64,
        }
    }

    pub fn eof(&mut self) -> WireResult<bool> {
        Ok(self.stream.eof()?)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.stream.pos() as usize
    }

    fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.stream.pos())
    }

    /// Reads a tag and splits it into field number and wire type.
    pub fn read_tag(&mut self) -> WireResult<(u32, WireType)> {
        let tag = self.stream.read_raw_varint32()?;
        let field_number = tag >> 3;
        if field_number == 0 {
            return Err(WireError::InvalidTag(tag));
        }
        let wire_type =
            WireType::from_raw(tag & 7).ok_or(WireError::InvalidWireType {
                field_number,
                wire_type: tag & 7,
            })?;
        Ok((field_number, wire_type))
    }

    pub fn read_varint(&mut self) -> WireResult<u64> {
        Ok(self.stream.read_raw_varint64()?)
    }

    pub fn read_fixed32(&mut self) -> WireResult<u32> {
        Ok(self.stream.read_raw_little_endian32()?)
    }

    pub fn read_fixed64(&mut self) -> WireResult<u64> {
        Ok(self.stream.read_raw_little_endian64()?)
    }

    /// Reads a length prefix and the bytes it covers.
    pub fn read_length_delimited(&mut self) -> WireResult<Vec<u8>> {
        let length = self.stream.read_raw_varint64()?;
        let remaining = self.remaining();
        if length > remaining {
            return Err(WireError::LengthOutOfBounds { length, remaining });
        }
        Ok(self.stream.read_raw_bytes(length as u32)?)
    }

    /// Consumes the value of a field this reader has no use for. Groups are
    /// skipped with an explicit stack so nesting cannot exhaust the call stack.
    pub fn skip(&mut self, field_number: u32, wire_type: WireType) -> WireResult<()> {
        let mut groups: Vec<u32> = Vec::new();
        let (mut number, mut wire_type) = (field_number, wire_type);
        loop {
            match wire_type {
                WireType::Varint => {
                    self.read_varint()?;
                }
                WireType::Fixed64 => {
                    self.read_fixed64()?;
                }
                WireType::Fixed32 => {
                    self.read_fixed32()?;
                }
                WireType::LengthDelimited => {
                    self.read_length_delimited()?;
                }
                WireType::StartGroup => {
                    if groups.len() >= MAX_GROUP_DEPTH {
                        return Err(WireError::GroupTooDeep {
                            limit: MAX_GROUP_DEPTH,
                        });
                    }
                    groups.push(number);
                }
                WireType::EndGroup => match groups.pop() {
                    Some(open) if open == number => {}
                    _ => return Err(WireError::UnmatchedEndGroup(number)),
                },
            }
            if groups.is_empty() {
                return Ok(());
            }
            (number, wire_type) = self.read_tag()?;
        }
    }
}

/// Appends wire-encoded values to a byte buffer.
pub struct WireWriter<'a> {
    stream: CodedOutputStream<'a>,
}

impl<'a> WireWriter<'a> {
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        Self {
            stream: CodedOutputStream::vec(buffer),
        }
    }

    pub fn write_tag(&mut self, field_number: u32, wire_type: WireType) -> WireResult<()> {
        Ok(self
            .stream
            .write_raw_varint32((field_number << 3) | wire_type.raw())?)
    }

    pub fn write_varint(&mut self, value: u64) -> WireResult<()> {
        Ok(self.stream.write_raw_varint64(value)?)
    }

    pub fn write_fixed32(&mut self, value: u32) -> WireResult<()> {
        Ok(self.stream.write_raw_little_endian32(value)?)
    }

    pub fn write_fixed64(&mut self, value: u64) -> WireResult<()> {
        Ok(self.stream.write_raw_little_endian64(value)?)
    }

    pub fn write_length_delimited(&mut self, bytes: &[u8]) -> WireResult<()> {
        self.stream.write_raw_varint64(bytes.len() as u64)?;
        Ok(self.stream.write_raw_bytes(bytes)?)
    }

    pub fn finish(mut self) -> WireResult<()> {
        Ok(self.stream.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode64(-2), 3);
        assert_eq!(zigzag_decode32(1), -1);
        assert_eq!(zigzag_decode64(4294967294), 2147483647);
        assert_eq!(zigzag_decode64(zigzag_encode64(i64::MIN)), i64::MIN);
    }

    #[test]
    fn test_read_tag() {
        let mut reader = WireReader::new(&[0x08, 0x96, 0x01]);
        assert_eq!(reader.read_tag().unwrap(), (1, WireType::Varint));
        assert_eq!(reader.read_varint().unwrap(), 150);
        assert!(reader.eof().unwrap());
    }

    #[test]
    fn test_zero_field_number_is_invalid() {
        let mut reader = WireReader::new(&[0x00]);
        assert_eq!(reader.read_tag(), Err(WireError::InvalidTag(0)));
    }

    #[test]
    fn test_invalid_wire_type() {
        let mut reader = WireReader::new(&[0x0e]);
        assert_eq!(
            reader.read_tag(),
            Err(WireError::InvalidWireType {
                field_number: 1,
                wire_type: 6
            })
        );
    }

    #[test]
    fn test_length_beyond_end() {
        let mut reader = WireReader::new(&[0x0a, 0x05, b'a', b'b']);
        reader.read_tag().unwrap();
        assert_eq!(
            reader.read_length_delimited(),
            Err(WireError::LengthOutOfBounds {
                length: 5,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_truncated_varint() {
        let mut reader = WireReader::new(&[0x08, 0x96]);
        reader.read_tag().unwrap();
        assert!(matches!(reader.read_varint(), Err(WireError::Stream(_))));
    }

    #[test]
    fn test_push_varint_matches_writer() {
        for value in [0, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut pushed = Vec::new();
            push_varint(&mut pushed, value);
            let mut written = Vec::new();
            let mut writer = WireWriter::new(&mut written);
            writer.write_varint(value).unwrap();
            writer.finish().unwrap();
            assert_eq!(pushed, written, "{value}");
        }
    }

    #[test]
    fn test_skip_group() {
        // field 2 start-group { field 1 varint 1 } field 2 end-group, then field 3 varint 7
        let data = [0x13, 0x08, 0x01, 0x14, 0x18, 0x07];
        let mut reader = WireReader::new(&data);
        let (number, wire_type) = reader.read_tag().unwrap();
        reader.skip(number, wire_type).unwrap();
        assert_eq!(reader.read_tag().unwrap(), (3, WireType::Varint));
        assert_eq!(reader.read_varint().unwrap(), 7);
    }

    #[test]
    fn test_skip_nested_groups_up_to_limit() {
        let mut data = vec![0x13; MAX_GROUP_DEPTH];
        data.extend(std::iter::repeat(0x14).take(MAX_GROUP_DEPTH));
        let mut reader = WireReader::new(&data);
        let (number, wire_type) = reader.read_tag().unwrap();
        reader.skip(number, wire_type).unwrap();
        assert!(reader.eof().unwrap());

        let data = vec![0x13; MAX_GROUP_DEPTH + 1];
        let mut reader = WireReader::new(&data);
        let (number, wire_type) = reader.read_tag().unwrap();
        assert_eq!(
            reader.skip(number, wire_type),
            Err(WireError::GroupTooDeep {
                limit: MAX_GROUP_DEPTH
            })
        );
    }

    #[test]
    fn test_writer_round_trip() {
        let mut buffer = Vec::new();
        let mut writer = WireWriter::new(&mut buffer);
        writer.write_tag(1, WireType::LengthDelimited).unwrap();
        writer.write_length_delimited(b"value").unwrap();
        writer.write_tag(2, WireType::Fixed32).unwrap();
        writer.write_fixed32(7).unwrap();
        writer.finish().unwrap();
        assert_eq!(
            buffer,
            [0x0a, 0x05, b'v', b'a', b'l', b'u', b'e', 0x15, 0x07, 0, 0, 0]
        );
    }
}
