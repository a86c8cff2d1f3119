//! Record stream reader.
//!
//! Each record is an offset line, a key line, a 4-byte big-endian value
//! length and that many value bytes. The stream ends cleanly when no length
//! prefix follows.

use std::io::{BufRead, ErrorKind, Read};

use crate::framing::FramingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: String,
    pub key: String,
    pub value: Vec<u8>,
}

pub struct RecordReader<R> {
    inner: R,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next record, or `None` at the end of the stream.
    pub fn next_record(&mut self) -> Result<Option<Record>, FramingError> {
        let offset = self.read_line()?;
        let key = self.read_line()?;

        let mut length = [0u8; 4];
        let filled = read_up_to(&mut self.inner, &mut length)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < length.len() {
            return Err(FramingError::UnexpectedEof("record length"));
        }

        // The prefix is untrusted, so the buffer grows with the bytes actually read.
        let length = u32::from_be_bytes(length) as u64;
        let mut value = Vec::new();
        (&mut self.inner).take(length).read_to_end(&mut value)?;
        if (value.len() as u64) < length {
            return Err(FramingError::UnexpectedEof("record value"));
        }

        Ok(Some(Record {
            offset: offset.unwrap_or_default(),
            key: key.unwrap_or_default(),
            value,
        }))
    }

    /// One line without its terminator; `None` when nothing is left.
    fn read_line(&mut self) -> Result<Option<String>, FramingError> {
        let mut line = Vec::new();
        if self.inner.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Like `read_exact`, but reports how much was read before EOF.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes(offset: &str, key: &str, value: &[u8]) -> Vec<u8> {
        let mut out = format!("{offset}\n{key}\n").into_bytes();
        out.extend_from_slice(&(value.len() as u32).to_be_bytes());
        out.extend_from_slice(value);
        out
    }

    #[test]
    fn test_reads_records_until_eof() {
        let mut data = record_bytes("17", "user-1", &[1, 2, 3]);
        data.extend(record_bytes("18", "", &[]));
        let records: Vec<Record> = RecordReader::new(data.as_slice())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            records,
            vec![
                Record {
                    offset: "17".to_string(),
                    key: "user-1".to_string(),
                    value: vec![1, 2, 3],
                },
                Record {
                    offset: "18".to_string(),
                    key: String::new(),
                    value: Vec::new(),
                },
            ]
        );
    }

    #[test]
    fn test_value_may_contain_newlines() {
        let data = record_bytes("1", "k", b"a\nb\n");
        let record = RecordReader::new(data.as_slice())
            .next_record()
            .unwrap()
            .unwrap();
        assert_eq!(record.value, b"a\nb\n");
    }

    #[test]
    fn test_empty_stream() {
        let mut reader = RecordReader::new(&b""[..]);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_lines_without_length_end_the_stream() {
        let mut reader = RecordReader::new(&b"5\nkey\n"[..]);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_huge_length_with_short_value_is_fatal() {
        let mut reader = RecordReader::new(&b"5\nkey\n\xff\xff\xff\xffabc"[..]);
        assert!(matches!(
            reader.next_record(),
            Err(FramingError::UnexpectedEof("record value"))
        ));
    }

    #[test]
    fn test_partial_length_is_fatal() {
        let mut reader = RecordReader::new(&b"5\nkey\n\x00\x00"[..]);
        assert!(matches!(
            reader.next_record(),
            Err(FramingError::UnexpectedEof("record length"))
        ));
    }

    #[test]
    fn test_short_value_is_fatal() {
        let mut reader = RecordReader::new(&b"5\nkey\n\x00\x00\x00\x05ab"[..]);
        assert!(matches!(
            reader.next_record(),
            Err(FramingError::UnexpectedEof("record value"))
        ));
    }
}
