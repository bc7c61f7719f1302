use crate::MineError;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

pub type ByteStream = Box<dyn Read + Send>;

/// Fetch transport: `get(url, timeout)` yields the raw response body.
pub trait DownloaderLike: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<ByteStream, MineError>;
}

pub fn scheme_of(url: &str) -> Option<&str> {
    url.split_once("://").map(|(scheme, _)| scheme)
}

/// Serves `file://` URLs from local disk. Used for local runs and tests.
#[derive(Debug, Default, Clone)]
pub struct FileDownloader;

impl FileDownloader {
    pub fn new() -> Self {
        FileDownloader
    }
}

impl DownloaderLike for FileDownloader {
    fn get(&self, url: &str, _timeout: Duration) -> Result<ByteStream, MineError> {
        let Some(path) = url.strip_prefix("file://") else {
            return Err(MineError::UnsupportedProtocol(url.to_string()));
        };
        let file = std::fs::File::open(PathBuf::from(path)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MineError::Other(format!("no such file: {}", path))
            } else {
                MineError::Transport(format!("{}: {}", url, e))
            }
        })?;
        Ok(Box::new(file))
    }
}

/// Blocking HTTP(S) transport. Must be driven from a blocking thread.
#[cfg(feature = "distributed")]
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "distributed")]
impl HttpDownloader {
    pub fn new() -> Result<Self, MineError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("crawlmine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MineError::Other(format!("http client: {}", e)))?;
        Ok(Self { client })
    }

    fn classify(url: &str, e: reqwest::Error) -> MineError {
        if e.is_timeout() {
            MineError::RequestTimeout(format!("{}: {}", url, e))
        } else if e.is_builder() {
            MineError::UnsupportedProtocol(format!("{}: {}", url, e))
        } else {
            MineError::Transport(format!("{}: {}", url, e))
        }
    }
}

#[cfg(feature = "distributed")]
impl DownloaderLike for HttpDownloader {
    fn get(&self, url: &str, timeout: Duration) -> Result<ByteStream, MineError> {
        match scheme_of(url) {
            Some("http") | Some("https") => {}
            _ => return Err(MineError::UnsupportedProtocol(url.to_string())),
        }
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| Self::classify(url, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(Box::new(response));
        }
        match status.as_u16() {
            408 => Err(MineError::RequestTimeout(format!("{}: HTTP {}", url, status))),
            429 | 500..=599 => Err(MineError::Transport(format!("{}: HTTP {}", url, status))),
            _ => Err(MineError::Other(format!("{}: HTTP {}", url, status))),
        }
    }
}
