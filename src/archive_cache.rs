use crate::MineError;
use crate::config::{DOWNLOAD_TIMEOUT, RetryPolicy};
use crate::downloader::{ByteStream, DownloaderLike, scheme_of};
use crate::retry::retry_blocking;
use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolves archive paths to decompressed byte streams, caching the
/// compressed artifact under `cache_dir/<segment>/<file name>`.
pub struct ArchiveCache {
    downloader: Arc<dyn DownloaderLike>,
    cache_dir: PathBuf,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ArchiveCache {
    pub fn new(downloader: Arc<dyn DownloaderLike>, cache_dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            downloader,
            cache_dir: cache_dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DOWNLOAD_TIMEOUT,
            retry: RetryPolicy::download(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Absolute URLs pass through; relative archive paths hang off the base URL.
    pub fn url_for(&self, archive_path: &str) -> String {
        if scheme_of(archive_path).is_some() {
            archive_path.to_string()
        } else {
            format!("{}/{}", self.base_url, archive_path.trim_start_matches('/'))
        }
    }

    /// Deterministic cache location: the crawl segment id (the component after
    /// `segments/`, else the parent directory) joined with the base file name.
    pub fn cache_path(&self, archive_path: &str) -> PathBuf {
        let without_scheme = archive_path.split_once("://").map(|(_, rest)| rest).unwrap_or(archive_path);
        let parts: Vec<&str> = without_scheme
            .split('/')
            .filter(|p| !p.is_empty() && *p != "." && *p != "..")
            .collect();
        let file_name = parts.last().copied().unwrap_or("archive");
        let segment = parts
            .iter()
            .position(|p| *p == "segments")
            .and_then(|i| parts.get(i + 1))
            .or_else(|| parts.len().checked_sub(2).and_then(|i| parts.get(i)))
            .copied()
            .unwrap_or("unsegmented");
        self.cache_dir.join(segment).join(file_name)
    }

    pub fn resolve(&self, archive_path: &str, use_caching: bool) -> Result<ArchiveStream, MineError> {
        let dest = self.cache_path(archive_path);

        if use_caching && dest.is_file() {
            info!(archive = archive_path, cache = %dest.display(), "serving archive from cache");
            let file = File::open(&dest)?;
            return Ok(ArchiveStream::new(Source::Cached { file, path: dest }, archive_path));
        }

        let url = self.url_for(archive_path);
        if use_caching {
            info!(archive = archive_path, %url, "downloading archive into cache");
            let remote = self.downloader.get(&url, self.timeout)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let partial = partial_path(&dest);
            let sink = BufWriter::new(File::create(&partial)?);
            return Ok(ArchiveStream::new(
                Source::Tee { remote, sink: Some(sink), partial, dest },
                archive_path,
            ));
        }

        info!(archive = archive_path, %url, "streaming archive without cache");
        let remote = retry_blocking(&url, self.retry, || self.downloader.get(&url, self.timeout))?;
        Ok(ArchiveStream::new(Source::Remote(remote), archive_path))
    }
}

/// Unique per process and call so concurrent workers never share a partial.
fn partial_path(dest: &Path) -> PathBuf {
    let name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    dest.with_file_name(format!(
        "{}.{}.{}.part",
        name,
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ))
}

/// Moves a finished partial into place. Fails with `AlreadyExists` when
/// another worker installed the same archive first.
fn install_partial(partial: &Path, dest: &Path) -> Result<(), MineError> {
    if dest.exists() {
        let _ = fs::remove_file(partial);
        return Err(MineError::AlreadyExists(dest.display().to_string()));
    }
    fs::rename(partial, dest)?;
    Ok(())
}

enum Source {
    Cached {
        file: File,
        path: PathBuf,
    },
    Tee {
        remote: ByteStream,
        sink: Option<BufWriter<File>>,
        partial: PathBuf,
        dest: PathBuf,
    },
    Remote(ByteStream),
}

impl Source {
    fn commit(&mut self) -> Result<(), MineError> {
        if let Source::Tee { sink, partial, dest, .. } = self {
            let Some(sink) = sink.take() else { return Ok(()) };
            let file = sink.into_inner().map_err(|e| MineError::Io(e.into_error()))?;
            file.sync_all()?;
            drop(file);
            match install_partial(partial, dest) {
                Ok(()) => info!(cache = %dest.display(), "archive cached"),
                Err(MineError::AlreadyExists(existing)) => {
                    debug!(cache = %existing, "archive already cached by another worker")
                }
                Err(e) => {
                    let _ = fs::remove_file(&*partial);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Never leave a cache entry behind that failed to decompress.
    fn purge(&mut self) {
        match self {
            Source::Cached { path, .. } => {
                warn!(cache = %path.display(), "purging corrupt cache entry");
                let _ = fs::remove_file(&*path);
            }
            Source::Tee { sink, partial, .. } => {
                sink.take();
                let _ = fs::remove_file(&*partial);
            }
            Source::Remote(_) => {}
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Cached { file, .. } => file.read(buf),
            Source::Remote(remote) => remote.read(buf),
            Source::Tee { remote, sink, .. } => {
                let n = remote.read(buf)?;
                if let Some(sink) = sink {
                    sink.write_all(&buf[..n])?;
                }
                Ok(n)
            }
        }
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        if let Source::Tee { sink, partial, .. } = self {
            if sink.take().is_some() {
                let _ = fs::remove_file(&*partial);
            }
        }
    }
}

/// Decompressed view of one archive. Reading it to the end installs a teed
/// download into the cache; a decompression error purges it.
pub struct ArchiveStream {
    decoder: MultiGzDecoder<Source>,
    archive_path: String,
    finished: bool,
}

impl ArchiveStream {
    fn new(source: Source, archive_path: &str) -> Self {
        Self {
            decoder: MultiGzDecoder::new(source),
            archive_path: archive_path.to_string(),
            finished: false,
        }
    }
}

impl Read for ArchiveStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        match self.decoder.read(buf) {
            Ok(0) => {
                self.finished = true;
                self.decoder.get_mut().commit().map_err(io::Error::other)?;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.finished = true;
                self.decoder.get_mut().purge();
                match e.kind() {
                    ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
                        Err(io::Error::new(
                            ErrorKind::InvalidData,
                            format!("{}: {}", self.archive_path, e),
                        ))
                    }
                    _ => Err(e),
                }
            }
        }
    }
}
