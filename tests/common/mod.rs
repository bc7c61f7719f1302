#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ARCHIVE: &str =
    "crawl-data/CC-MAIN-2024-30/segments/1720763514387.30/wet/CC-MAIN-20240712-00000.warc.wet.gz";

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn wet_record(record_type: &str, uri: &str, content: &str) -> String {
    format!(
        "WARC/1.0\r\nWARC-Type: {}\r\nWARC-Target-URI: {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}\r\n\r\n",
        record_type,
        uri,
        content.len(),
        content
    )
}

/// Writes `body` gzipped under `root/<relative>` and returns the full path.
pub fn write_archive(root: &Path, relative: &str, body: &[u8]) -> PathBuf {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, gzip(body)).unwrap();
    path
}

pub fn file_base_url(root: &Path) -> String {
    format!("file://{}", root.display())
}
