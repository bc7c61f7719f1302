mod common;

use common::{file_base_url, gzip};
use crawlmine::MineError;
use crawlmine::config::RetryPolicy;
use crawlmine::downloader::FileDownloader;
use crawlmine::populate::discover_archive_paths;
use crawlmine::queue::{MemoryQueue, QueueBackendLike, WorkItem, WorkQueueClient};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Tracks how many creates are running at once.
#[derive(Default)]
struct InstrumentedQueue {
    inner: MemoryQueue,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl QueueBackendLike for InstrumentedQueue {
    async fn lease(&self, visibility_timeout: Duration) -> Result<Option<WorkItem>, MineError> {
        self.inner.lease(visibility_timeout).await
    }

    async fn ack(&self, item: &WorkItem) -> Result<(), MineError> {
        self.inner.ack(item).await
    }

    async fn create(&self, payload: &str) -> Result<u64, MineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(120)).await;
        let id = self.inner.create(payload).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        id
    }

    async fn pending_count(&self) -> Result<usize, MineError> {
        self.inner.pending_count().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_populate_never_exceeds_concurrency_limit() {
    let backend = Arc::new(InstrumentedQueue::default());
    let client = WorkQueueClient::new(backend.clone());
    let items: Vec<String> = (0..5).map(|i| format!("segment-{}.warc.wet.gz", i)).collect();

    let report = client.populate(items, 2).await;

    assert_eq!(report.created, 5);
    assert_eq!(report.failed, 0);
    assert!(backend.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert!(backend.max_in_flight.load(Ordering::SeqCst) >= 1);
    assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(client.pending_count().await.unwrap(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_populated_items_are_leased_in_order() {
    let backend = Arc::new(InstrumentedQueue::default());
    let client = WorkQueueClient::new(backend.clone());
    client.populate(vec!["a".to_string()], 4).await;
    client.populate(vec!["b".to_string()], 4).await;

    let first = client.lease(Duration::from_secs(10)).await.unwrap().unwrap();
    let second = client.lease(Duration::from_secs(10)).await.unwrap().unwrap();
    assert_eq!((first.payload.as_str(), second.payload.as_str()), ("a", "b"));
    assert!(client.lease(Duration::from_secs(10)).await.unwrap().is_none());

    client.ack(&first).await.unwrap();
    client.ack(&second).await.unwrap();
    assert_eq!(client.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_discovered_crawl_paths_feed_the_queue() {
    let root = tempfile::tempdir().unwrap();
    let listing = root.path().join("crawl-data").join("CC-MAIN-2024-30");
    std::fs::create_dir_all(&listing).unwrap();
    std::fs::write(
        listing.join("wet.paths.gz"),
        gzip(b"crawl-data/CC-MAIN-2024-30/segments/1/wet/a.warc.wet.gz\ncrawl-data/CC-MAIN-2024-30/segments/2/wet/b.warc.wet.gz\n"),
    )
    .unwrap();

    let paths = discover_archive_paths(
        &FileDownloader::new(),
        &file_base_url(root.path()),
        "CC-MAIN-2024-30",
        RetryPolicy::none(),
    )
    .unwrap();
    assert_eq!(paths.len(), 2);

    let client = WorkQueueClient::new(Arc::new(MemoryQueue::new()));
    let report = client.populate(paths, 2).await;
    assert_eq!(report.created, 2);
    assert_eq!(client.pending_count().await.unwrap(), 2);
}
