use crate::MineError;
use crate::config::{POPULATE_POLL_INTERVAL, RetryPolicy};
use crate::pending::PendingCounter;
use crate::retry::retry_async;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One leased unit of work. The token identifies this particular lease and
/// must be presented to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: u64,
    pub lease_token: String,
    pub payload: String,
}

/// Durable queue with lease-and-visibility-timeout consumption.
pub trait QueueBackendLike: Send + Sync {
    /// Hands out one item nobody else holds, hidden from other leasers until
    /// `visibility_timeout` passes. `None` when nothing is leasable.
    fn lease(&self, visibility_timeout: Duration) -> impl Future<Output = Result<Option<WorkItem>, MineError>> + Send;
    /// Deletes the item. Fails with `LeaseExpiredOnAck` if the token is stale.
    fn ack(&self, item: &WorkItem) -> impl Future<Output = Result<(), MineError>> + Send;
    fn create(&self, payload: &str) -> impl Future<Output = Result<u64, MineError>> + Send;
    /// Items not yet acknowledged, leased or not.
    fn pending_count(&self) -> impl Future<Output = Result<usize, MineError>> + Send;
}

#[derive(Debug)]
struct Entry {
    payload: String,
    lease_token: Option<String>,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    entries: BTreeMap<u64, Entry>,
}

/// In-process backend. Visibility runs on tokio's clock, so paused-time
/// tests can step past a lease.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let queue = Self::new();
        {
            let mut state = queue.state.lock().await;
            for item in items {
                let id = state.next_id;
                state.next_id += 1;
                state.entries.insert(
                    id,
                    Entry { payload: item.as_ref().to_string(), lease_token: None, visible_at: Instant::now() },
                );
            }
        }
        queue
    }
}

impl QueueBackendLike for MemoryQueue {
    async fn lease(&self, visibility_timeout: Duration) -> Result<Option<WorkItem>, MineError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let Some((&id, entry)) = state.entries.iter_mut().find(|(_, e)| e.visible_at <= now) else {
            return Ok(None);
        };
        let token = uuid::Uuid::new_v4().to_string();
        entry.lease_token = Some(token.clone());
        entry.visible_at = now + visibility_timeout;
        Ok(Some(WorkItem { id, lease_token: token, payload: entry.payload.clone() }))
    }

    async fn ack(&self, item: &WorkItem) -> Result<(), MineError> {
        let mut state = self.state.lock().await;
        match state.entries.get(&item.id) {
            Some(entry) if entry.lease_token.as_deref() == Some(item.lease_token.as_str()) => {
                state.entries.remove(&item.id);
                Ok(())
            }
            _ => Err(MineError::LeaseExpiredOnAck(format!("item {} ({})", item.id, item.payload))),
        }
    }

    async fn create(&self, payload: &str) -> Result<u64, MineError> {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.entries.insert(
            id,
            Entry { payload: payload.to_string(), lease_token: None, visible_at: Instant::now() },
        );
        Ok(id)
    }

    async fn pending_count(&self) -> Result<usize, MineError> {
        Ok(self.state.lock().await.entries.len())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub created: usize,
    pub failed: usize,
}

/// Retrying client over a queue backend.
pub struct WorkQueueClient<B> {
    backend: Arc<B>,
    retry: RetryPolicy,
}

impl<B> Clone for WorkQueueClient<B> {
    fn clone(&self) -> Self {
        Self { backend: Arc::clone(&self.backend), retry: self.retry }
    }
}

impl<B: QueueBackendLike + 'static> WorkQueueClient<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend, retry: RetryPolicy::queue() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    #[instrument(skip(self))]
    pub async fn lease(&self, visibility_timeout: Duration) -> Result<Option<WorkItem>, MineError> {
        let leased = retry_async("queue lease", self.retry, || self.backend.lease(visibility_timeout)).await?;
        if let Some(item) = &leased {
            debug!(id = item.id, payload = %item.payload, "leased work item");
        }
        Ok(leased)
    }

    #[instrument(skip(self, item), fields(id = item.id))]
    pub async fn ack(&self, item: &WorkItem) -> Result<(), MineError> {
        retry_async("queue ack", self.retry, || self.backend.ack(item)).await
    }

    pub async fn create(&self, payload: &str) -> Result<u64, MineError> {
        retry_async("queue create", self.retry, || self.backend.create(payload)).await
    }

    pub async fn pending_count(&self) -> Result<usize, MineError> {
        retry_async("queue pending count", self.retry, || self.backend.pending_count()).await
    }

    /// Enqueues every item with at most `concurrency_limit` creates in flight.
    /// Admission polls the in-flight count rather than blocking on a
    /// semaphore. Failed creates are logged and skipped.
    #[instrument(skip(self, items), fields(total = items.len()))]
    pub async fn populate(&self, items: Vec<String>, concurrency_limit: usize) -> PopulateReport {
        let limit = concurrency_limit.max(1);
        let in_flight = PendingCounter::new();
        let mut handles = Vec::with_capacity(items.len());

        for payload in items {
            while in_flight.count() >= limit {
                tokio::time::sleep(POPULATE_POLL_INTERVAL).await;
            }
            let guard = in_flight.enter();
            let backend = Arc::clone(&self.backend);
            let retry = self.retry;
            handles.push(tokio::spawn(async move {
                let result = retry_async("queue create", retry, || backend.create(&payload)).await;
                drop(guard);
                result.map_err(|e| (payload, e))
            }));
        }

        let mut report = PopulateReport::default();
        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => report.created += 1,
                Ok(Err((payload, e))) => {
                    warn!(%payload, error = %e, "failed to enqueue item, continuing");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "enqueue task failed, continuing");
                    report.failed += 1;
                }
            }
        }
        info!(created = report.created, failed = report.failed, "population finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VISIBILITY: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_lease_hides_item_until_ack() {
        let queue = MemoryQueue::with_items(["a", "b"]).await;
        let first = queue.lease(VISIBILITY).await.unwrap().unwrap();
        let second = queue.lease(VISIBILITY).await.unwrap().unwrap();
        assert_eq!(first.payload, "a");
        assert_eq!(second.payload, "b");
        assert!(queue.lease(VISIBILITY).await.unwrap().is_none());

        queue.ack(&first).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_becomes_leasable_again() {
        let queue = MemoryQueue::with_items(["segment-0"]).await;
        let crashed = queue.lease(VISIBILITY).await.unwrap().unwrap();
        assert!(queue.lease(VISIBILITY).await.unwrap().is_none());

        tokio::time::advance(VISIBILITY + Duration::from_secs(1)).await;

        let retried = queue.lease(VISIBILITY).await.unwrap().unwrap();
        assert_eq!(retried.id, crashed.id);
        assert_ne!(retried.lease_token, crashed.lease_token);

        assert!(matches!(queue.ack(&crashed).await, Err(MineError::LeaseExpiredOnAck(_))));
        queue.ack(&retried).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_leases_nothing() {
        let queue = MemoryQueue::new();
        assert!(queue.lease(VISIBILITY).await.unwrap().is_none());
    }

    /// Fails the first `failures` calls of every operation with a queue error.
    struct FlakyQueue {
        inner: MemoryQueue,
        failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FlakyQueue {
        fn trip(&self) -> Result<(), MineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(MineError::Queue("connection refused".to_string()));
            }
            Ok(())
        }
    }

    impl QueueBackendLike for FlakyQueue {
        async fn lease(&self, visibility_timeout: Duration) -> Result<Option<WorkItem>, MineError> {
            self.trip()?;
            self.inner.lease(visibility_timeout).await
        }
        async fn ack(&self, item: &WorkItem) -> Result<(), MineError> {
            self.trip()?;
            self.inner.ack(item).await
        }
        async fn create(&self, payload: &str) -> Result<u64, MineError> {
            self.trip()?;
            self.inner.create(payload).await
        }
        async fn pending_count(&self) -> Result<usize, MineError> {
            self.trip()?;
            self.inner.pending_count().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_retries_transient_backend_errors() {
        let backend = Arc::new(FlakyQueue {
            inner: MemoryQueue::with_items(["x"]).await,
            failures: AtomicUsize::new(3),
            calls: AtomicUsize::new(0),
        });
        let client = WorkQueueClient::new(backend.clone());
        let item = client.lease(VISIBILITY).await.unwrap().unwrap();
        assert_eq!(item.payload, "x");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_gives_up_after_retry_budget() {
        let backend = Arc::new(FlakyQueue {
            inner: MemoryQueue::with_items(["x"]).await,
            failures: AtomicUsize::new(100),
            calls: AtomicUsize::new(0),
        });
        let client = WorkQueueClient::new(backend.clone());
        assert!(matches!(client.lease(VISIBILITY).await, Err(MineError::Queue(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_populate_logs_failures_and_continues() {
        let backend = Arc::new(FlakyQueue {
            inner: MemoryQueue::new(),
            failures: AtomicUsize::new(1),
            calls: AtomicUsize::new(0),
        });
        let client = WorkQueueClient::new(backend.clone()).with_retry_policy(RetryPolicy::none());
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let report = client.populate(items, 1).await;
        assert_eq!(report, PopulateReport { created: 2, failed: 1 });
        assert_eq!(client.pending_count().await.unwrap(), 2);
    }
}
