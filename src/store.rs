use crate::MineError;
use crate::page::Page;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// Sink for accepted pages. `flush` is called once per finished archive and
/// must make everything stored so far durable.
pub trait PageStoreLike: Send + Sync {
    fn store(&self, page: &Page, score: f64) -> impl Future<Output = Result<(), MineError>> + Send;
    fn flush(&self) -> impl Future<Output = Result<(), MineError>> + Send;
}

/// Content-addressed key, so the same page stored twice collapses downstream.
pub fn page_key(content: &str) -> String {
    format!("{:016x}", xxh3_64(content.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPage {
    pub key: String,
    pub score: f64,
    pub page: Page,
}

impl StoredPage {
    pub fn new(page: &Page, score: f64) -> Self {
        Self { key: page_key(&page.content), score, page: page.clone() }
    }
}

/// Appends one JSON line per page to a local file. File writes run on the
/// blocking pool.
pub struct JsonlPageStore {
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl JsonlPageStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MineError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "opened page store");
        Ok(Self { path, writer: Arc::new(Mutex::new(BufWriter::new(file))) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_writer<F>(&self, op: F) -> Result<(), MineError>
    where
        F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()> + Send + 'static,
    {
        let writer = Arc::clone(&self.writer);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = writer
                .lock()
                .map_err(|_| MineError::Store(format!("{}: writer lock poisoned", path.display())))?;
            op(&mut guard).map_err(|e| MineError::Store(format!("{}: {}", path.display(), e)))
        })
        .await?
    }
}

impl PageStoreLike for JsonlPageStore {
    async fn store(&self, page: &Page, score: f64) -> Result<(), MineError> {
        let mut line = serde_json::to_vec(&StoredPage::new(page, score))?;
        line.push(b'\n');
        self.with_writer(move |writer| writer.write_all(&line)).await
    }

    async fn flush(&self) -> Result<(), MineError> {
        self.with_writer(|writer| {
            writer.flush()?;
            writer.get_ref().sync_data()
        })
        .await
    }
}

pub fn read_stored_pages(path: &Path) -> Result<Vec<StoredPage>, MineError> {
    let reader = BufReader::new(File::open(path)?);
    let mut pages = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let page = serde_json::from_str(&line)
            .map_err(|e| MineError::Parse(format!("{}:{}: {}", path.display(), n + 1, e)))?;
        pages.push(page);
    }
    debug!(path = %path.display(), pages = pages.len(), "read stored pages");
    Ok(pages)
}

/// Buffers an archive's pages and uploads them as one JSONL object on flush.
/// The object key hashes the sorted body, so reprocessing an archive after a
/// crash overwrites the earlier upload instead of duplicating it.
#[cfg(feature = "distributed")]
pub struct S3PageStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    buffer: tokio::sync::Mutex<Vec<StoredPage>>,
}

#[cfg(feature = "distributed")]
impl S3PageStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.trim_end_matches('/').to_string(),
            buffer: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Reads `MINE_S3_BUCKET`, `MINE_S3_PREFIX`, `MINE_S3_REGION` and the
    /// optional `MINE_S3_ENDPOINT` for S3-compatible stores.
    pub async fn from_env() -> Result<Self, MineError> {
        let bucket = std::env::var("MINE_S3_BUCKET")
            .map_err(|_| MineError::Config("MINE_S3_BUCKET is not set".to_string()))?;
        let prefix = std::env::var("MINE_S3_PREFIX").unwrap_or_else(|_| "pages".to_string());
        let region = aws_config::Region::new(
            std::env::var("MINE_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        );
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region.clone())
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&base).region(region);
        if let Ok(endpoint) = std::env::var("MINE_S3_ENDPOINT") {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Ok(Self::new(aws_sdk_s3::Client::from_conf(builder.build()), &bucket, &prefix))
    }

    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    async fn upload(&self, pages: &[StoredPage]) -> Result<String, MineError> {
        let mut sorted: Vec<&StoredPage> = pages.iter().collect();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));
        sorted.dedup_by(|a, b| a.key == b.key);

        let mut body = Vec::new();
        for page in sorted {
            serde_json::to_writer(&mut body, page)?;
            body.push(b'\n');
        }
        let key = format!("{}/{:016x}.jsonl", self.prefix, xxh3_64(&body));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .send()
            .await
            .map_err(|e| MineError::Store(format!("S3 put {}: {}", key, e)))?;
        Ok(key)
    }
}

#[cfg(feature = "distributed")]
impl PageStoreLike for S3PageStore {
    async fn store(&self, page: &Page, score: f64) -> Result<(), MineError> {
        self.buffer.lock().await.push(StoredPage::new(page, score));
        Ok(())
    }

    /// A failed upload puts its pages back, so whichever loop flushes next
    /// uploads them again.
    async fn flush(&self) -> Result<(), MineError> {
        let pages = std::mem::take(&mut *self.buffer.lock().await);
        if pages.is_empty() {
            return Ok(());
        }
        match self.upload(&pages).await {
            Ok(key) => {
                info!(%key, pages = pages.len(), "uploaded page batch");
                Ok(())
            }
            Err(e) => {
                self.buffer.lock().await.extend(pages);
                Err(e)
            }
        }
    }
}
