use crate::MineError;
use crate::config::{DOWNLOAD_TIMEOUT, RetryPolicy};
use crate::downloader::DownloaderLike;
use crate::retry::retry_blocking;
use flate2::read::MultiGzDecoder;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use tracing::info;

/// Location of a crawl's gzipped listing of WET archive paths.
pub fn wet_paths_url(base_url: &str, crawl: &str) -> String {
    format!("{}/crawl-data/{}/wet.paths.gz", base_url.trim_end_matches('/'), crawl)
}

/// Downloads the crawl's path listing and returns one archive path per line.
pub fn discover_archive_paths(
    downloader: &dyn DownloaderLike,
    base_url: &str,
    crawl: &str,
    retry: RetryPolicy,
) -> Result<Vec<String>, MineError> {
    let crawl = crawl.trim();
    if crawl.is_empty() || crawl.contains('/') {
        return Err(MineError::Config(format!("invalid crawl id {:?}", crawl)));
    }
    let url = wet_paths_url(base_url, crawl);
    let raw = retry_blocking(&url, retry, || downloader.get(&url, DOWNLOAD_TIMEOUT))?;
    let paths = read_path_listing(raw)?;
    info!(crawl, archives = paths.len(), "discovered archive paths");
    Ok(paths)
}

pub fn read_path_listing<R: Read>(raw: R) -> Result<Vec<String>, MineError> {
    let reader = BufReader::new(MultiGzDecoder::new(raw));
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| match e.kind() {
            ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
                MineError::Decompression(format!("path listing: {}", e))
            }
            _ => MineError::Io(e),
        })?;
        let line = line.trim();
        if !line.is_empty() {
            paths.push(line.to_string());
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::FileDownloader;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_listing_skips_blank_lines() {
        let listing = gzip(b"crawl-data/a.warc.wet.gz\n\n  crawl-data/b.warc.wet.gz  \n");
        let paths = read_path_listing(listing.as_slice()).unwrap();
        assert_eq!(paths, vec!["crawl-data/a.warc.wet.gz", "crawl-data/b.warc.wet.gz"]);
    }

    #[test]
    fn test_corrupt_listing_is_decompression_error() {
        let result = read_path_listing(&b"plain text, not gzip"[..]);
        assert!(matches!(result, Err(MineError::Decompression(_))));
    }

    #[test]
    fn test_discovers_paths_from_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let crawl_dir = dir.path().join("crawl-data").join("CC-MAIN-2024-30");
        std::fs::create_dir_all(&crawl_dir).unwrap();
        std::fs::write(crawl_dir.join("wet.paths.gz"), gzip(b"one.wet.gz\ntwo.wet.gz\n")).unwrap();

        let base = format!("file://{}", dir.path().display());
        let paths = discover_archive_paths(&FileDownloader::new(), &base, "CC-MAIN-2024-30", RetryPolicy::none()).unwrap();
        assert_eq!(paths, vec!["one.wet.gz", "two.wet.gz"]);
    }

    #[test]
    fn test_rejects_malformed_crawl_id() {
        let result = discover_archive_paths(&FileDownloader::new(), "file:///tmp", "../etc", RetryPolicy::none());
        assert!(matches!(result, Err(MineError::Config(_))));
    }
}
