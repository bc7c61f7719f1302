use crate::MineError;
use crate::page::Record;
use std::collections::HashMap;
use std::io::{BufRead, ErrorKind, Read};

const CONTENT_LENGTH_HEADER: &str = "Content-Length";

/// Pull-based archive-record parser: `Ok(None)` signals end-of-stream.
pub trait RecordParserLike: Send {
    fn next_record(&mut self) -> Result<Option<Record>, MineError>;
}

/// Reads WARC/WET records: a `WARC/x.y` version line, `Name: value` headers,
/// a blank line, `Content-Length` bytes of content and trailing blank lines.
pub struct WetReader<R> {
    reader: R,
    records_read: usize,
}

impl<R: BufRead + Send> WetReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, records_read: 0 }
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }

    fn read_line(&mut self) -> Result<Option<String>, MineError> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).map_err(stream_error)?;
        if n == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

impl<R: BufRead + Send> RecordParserLike for WetReader<R> {
    fn next_record(&mut self) -> Result<Option<Record>, MineError> {
        let protocol = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if !protocol.starts_with("WARC/") {
            return Err(MineError::Parse(format!(
                "record {}: expected version line, got {:?}",
                self.records_read + 1,
                truncate(&protocol, 40)
            )));
        }

        let mut headers = HashMap::new();
        loop {
            match self.read_line()? {
                None => {
                    return Err(MineError::Parse(format!(
                        "record {}: stream ended inside headers",
                        self.records_read + 1
                    )));
                }
                Some(line) if line.is_empty() => break,
                Some(line) => {
                    let Some((name, value)) = line.split_once(':') else {
                        return Err(MineError::Parse(format!(
                            "record {}: malformed header {:?}",
                            self.records_read + 1,
                            truncate(&line, 40)
                        )));
                    };
                    headers.insert(name.trim().to_string(), value.trim().to_string());
                }
            }
        }

        let length = headers
            .get(CONTENT_LENGTH_HEADER)
            .ok_or_else(|| MineError::Parse(format!("record {}: missing Content-Length", self.records_read + 1)))?
            .parse::<u64>()
            .map_err(|e| MineError::Parse(format!("record {}: bad Content-Length: {}", self.records_read + 1, e)))?;

        // Allocation follows the bytes that arrive, not the header.
        let mut body = Vec::new();
        let read = (&mut self.reader).take(length).read_to_end(&mut body).map_err(stream_error)?;
        if (read as u64) < length {
            return Err(MineError::Parse(format!(
                "record {}: truncated content ({} of {} bytes)",
                self.records_read + 1,
                read,
                length
            )));
        }

        self.records_read += 1;
        Ok(Some(Record {
            protocol,
            headers,
            content: String::from_utf8_lossy(&body).into_owned(),
        }))
    }
}

/// Corrupt compressed input surfaces from the decoder as `InvalidData`.
fn stream_error(e: std::io::Error) -> MineError {
    if e.kind() == ErrorKind::InvalidData {
        MineError::Decompression(e.to_string())
    } else {
        MineError::Io(e)
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    pub(crate) fn wet_record(record_type: &str, uri: &str, content: &str) -> String {
        format!(
            "WARC/1.0\r\nWARC-Type: {}\r\nWARC-Target-URI: {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}\r\n\r\n",
            record_type,
            uri,
            content.len(),
            content
        )
    }

    #[test]
    fn test_reads_records_until_end_of_stream() {
        let data = format!(
            "{}{}",
            wet_record("warcinfo", "", "software: test"),
            wet_record("conversion", "http://example.com/", "Hello: world\nsecond line")
        );
        let mut reader = WetReader::new(Cursor::new(data.into_bytes()));

        let info = reader.next_record().unwrap().unwrap();
        assert_eq!(info.protocol, "WARC/1.0");
        assert_eq!(info.headers.get("WARC-Type").map(String::as_str), Some("warcinfo"));

        let page = reader.next_record().unwrap().unwrap();
        assert_eq!(page.headers.get("WARC-Target-URI").map(String::as_str), Some("http://example.com/"));
        assert_eq!(page.content, "Hello: world\nsecond line");

        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.records_read(), 2);
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let data = wet_record("conversion", "http://e.com/", "naïve café");
        let mut reader = WetReader::new(Cursor::new(data.into_bytes()));
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.content, "naïve café");
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_empty_stream_has_no_records() {
        let mut reader = WetReader::new(Cursor::new(Vec::new()));
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let mut reader = WetReader::new(Cursor::new(b"<html>not an archive</html>\n".to_vec()));
        assert!(matches!(reader.next_record(), Err(MineError::Parse(_))));
    }

    #[test]
    fn test_truncated_content_is_a_parse_error() {
        let data = "WARC/1.0\r\nWARC-Type: conversion\r\nContent-Length: 100\r\n\r\nshort";
        let mut reader = WetReader::new(Cursor::new(data.as_bytes().to_vec()));
        assert!(matches!(reader.next_record(), Err(MineError::Parse(_))));
    }

    #[test]
    fn test_oversized_content_length_is_a_parse_error() {
        let data = "WARC/1.0\r\nWARC-Type: conversion\r\nContent-Length: 18446744073709551615\r\n\r\nbody\r\n\r\n";
        let mut reader = WetReader::new(Cursor::new(data.as_bytes().to_vec()));
        assert!(matches!(reader.next_record(), Err(MineError::Parse(_))));
    }

    #[test]
    fn test_missing_content_length_is_a_parse_error() {
        let data = "WARC/1.0\r\nWARC-Type: conversion\r\n\r\nbody";
        let mut reader = WetReader::new(Cursor::new(data.as_bytes().to_vec()));
        assert!(matches!(reader.next_record(), Err(MineError::Parse(_))));
    }
}
