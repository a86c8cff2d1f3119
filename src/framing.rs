//! Confluent schema-registry framing of protobuf payloads.
//!
//! ```text
//! +-------+----------------+-------------------------+-----------------+
//! | magic | schema id      | message index           | protobuf bytes  |
//! | 0x00  | u32 big-endian | zigzag count, zigzag ids|                 |
//! +-------+----------------+-------------------------+-----------------+
//! ```
//!
//! A count of zero is shorthand for the index `[0]`.

use protoscribe_engine::codec::wire::{push_varint, zigzag_decode64, zigzag_encode64, WireReader};
use thiserror::Error;

pub const MAGIC_BYTE: u8 = 0;

/// Upper bound on the message-index count, to fail fast on corrupt frames.
pub const MAX_INDEX_COUNT: i64 = 100_000;

const HEADER_LEN: usize = 5;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Unexpected EOF while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("Incorrect magic byte ({0})")]
    BadMagic(u8),

    #[error("Invalid message index array length: {0}")]
    InvalidIndexCount(i64),

    #[error("Malformed message index: {0}")]
    MalformedIndex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed frame borrowing its payload from the record value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub schema_id: u32,
    pub message_index: Vec<i64>,
    pub payload: &'a [u8],
}

pub fn decode_frame(data: &[u8]) -> Result<Frame<'_>, FramingError> {
    let Some(&magic) = data.first() else {
        return Err(FramingError::UnexpectedEof("frame header"));
    };
    if magic != MAGIC_BYTE {
        return Err(FramingError::BadMagic(magic));
    }
    if data.len() < HEADER_LEN {
        return Err(FramingError::UnexpectedEof("frame header"));
    }
    let schema_id = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    let rest = &data[HEADER_LEN..];
    let mut reader = WireReader::new(rest);
    let mut read_index = || -> Result<i64, FramingError> {
        if reader.eof().map_err(|e| FramingError::MalformedIndex(e.to_string()))? {
            return Err(FramingError::UnexpectedEof("message index"));
        }
        reader
            .read_varint()
            .map(zigzag_decode64)
            .map_err(|_| FramingError::UnexpectedEof("message index"))
    };

    let count = read_index()?;
    if !(0..=MAX_INDEX_COUNT).contains(&count) {
        return Err(FramingError::InvalidIndexCount(count));
    }
    let message_index = if count == 0 {
        vec![0]
    } else {
        (0..count).map(|_| read_index()).collect::<Result<Vec<_>, _>>()?
    };

    let consumed = reader.position();
    Ok(Frame {
        schema_id,
        message_index,
        payload: &rest[consumed..],
    })
}

/// Frames `payload`; an index of `[0]` is written as a zero count.
pub fn encode_frame(schema_id: u32, message_index: &[i64], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + message_index.len() + 1 + payload.len());
    out.push(MAGIC_BYTE);
    out.extend_from_slice(&schema_id.to_be_bytes());

    let indexes: &[i64] = if message_index == [0] { &[] } else { message_index };
    push_varint(&mut out, zigzag_encode64(indexes.len() as i64));
    for &index in indexes {
        push_varint(&mut out, zigzag_encode64(index));
    }

    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame_with_zero_count() {
        let data = [0, 0, 0, 0, 42, 0, 0x08, 0x07];
        let frame = decode_frame(&data).unwrap();
        assert_eq!(frame.schema_id, 42);
        assert_eq!(frame.message_index, vec![0]);
        assert_eq!(frame.payload, &[0x08, 0x07]);
    }

    #[test]
    fn test_decode_frame_with_nested_index() {
        // count 2 (zigzag 4), indexes 1 (2) and 0 (0)
        let data = [0, 0, 0, 1, 0, 4, 2, 0, 0x08, 0x07];
        let frame = decode_frame(&data).unwrap();
        assert_eq!(frame.schema_id, 256);
        assert_eq!(frame.message_index, vec![1, 0]);
        assert_eq!(frame.payload, &[0x08, 0x07]);
    }

    #[test]
    fn test_negative_index_passes_through() {
        // count 1, index -1 (zigzag 1)
        let frame = decode_frame(&[0, 0, 0, 0, 1, 2, 1]).unwrap();
        assert_eq!(frame.message_index, vec![-1]);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let err = decode_frame(&[1, 0, 0, 0, 1, 0]).unwrap_err();
        assert!(matches!(err, FramingError::BadMagic(1)));
        assert_eq!(err.to_string(), "Incorrect magic byte (1)");
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            decode_frame(&[]),
            Err(FramingError::UnexpectedEof("frame header"))
        ));
        assert!(matches!(
            decode_frame(&[0, 0, 0]),
            Err(FramingError::UnexpectedEof("frame header"))
        ));
        assert!(matches!(
            decode_frame(&[0, 0, 0, 0, 1]),
            Err(FramingError::UnexpectedEof("message index"))
        ));
    }

    #[test]
    fn test_truncated_index() {
        // count 3 but only one index present
        assert!(matches!(
            decode_frame(&[0, 0, 0, 0, 1, 6, 2]),
            Err(FramingError::UnexpectedEof("message index"))
        ));
    }

    #[test]
    fn test_invalid_index_count() {
        // count -1
        assert!(matches!(
            decode_frame(&[0, 0, 0, 0, 1, 1]),
            Err(FramingError::InvalidIndexCount(-1))
        ));
        // count 100001 = zigzag 200002 = 0xc2 0x9a 0x0c
        assert!(matches!(
            decode_frame(&[0, 0, 0, 0, 1, 0xc2, 0x9a, 0x0c]),
            Err(FramingError::InvalidIndexCount(100_001))
        ));
    }

    #[test]
    fn test_encode_frame() {
        assert_eq!(encode_frame(42, &[0], &[0x08, 0x07]), [0, 0, 0, 0, 42, 0, 0x08, 0x07]);
        assert_eq!(encode_frame(256, &[1, 0], &[]), [0, 0, 0, 1, 0, 4, 2, 0]);
        let framed = encode_frame(7, &[2, 3], b"xy");
        let frame = decode_frame(&framed).unwrap();
        assert_eq!(frame.message_index, vec![2, 3]);
        assert_eq!(frame.payload, b"xy");
    }

    #[test]
    fn test_encode_frame_with_negative_and_large_indexes() {
        let framed = encode_frame(1, &[-1, 300], &[]);
        // count 2 (zigzag 4), -1 (zigzag 1), 300 (zigzag 600 = 0xd8 0x04)
        assert_eq!(framed, [0, 0, 0, 0, 1, 4, 1, 0xd8, 0x04]);
        assert_eq!(decode_frame(&framed).unwrap().message_index, vec![-1, 300]);
    }
}
