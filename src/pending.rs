use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counts in-flight units of work whose completion order is arbitrary.
/// Each unit holds a [`PendingGuard`]; dropping the guard completes it.
#[derive(Debug, Default)]
pub struct PendingCounter {
    count: AtomicUsize,
    released: Notify,
}

impl PendingCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enter(self: &Arc<Self>) -> PendingGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        PendingGuard { counter: Arc::clone(self) }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Resolves once the count is observed at zero.
    pub async fn wait_idle(&self) {
        self.wait_below(1).await
    }

    /// Resolves once fewer than `limit` units are in flight.
    pub async fn wait_below(&self, limit: usize) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count() < limit {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub struct PendingGuard {
    counter: Arc<PendingCounter>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.counter.count.fetch_sub(1, Ordering::SeqCst);
        self.counter.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_idle_counter_resolves_immediately() {
        let counter = PendingCounter::new();
        counter.wait_idle().await;
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_out_of_order_completion() {
        let counter = PendingCounter::new();
        let mut handles = Vec::new();
        for delay in [30u64, 10, 20] {
            let guard = counter.enter();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                drop(guard);
            }));
        }
        assert_eq!(counter.count(), 3);
        counter.wait_idle().await;
        assert_eq!(counter.count(), 0);
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_below_resolves_on_first_release() {
        let counter = PendingCounter::new();
        let slow = counter.enter();
        let fast = counter.enter();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(fast);
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(slow);
        });

        counter.wait_below(2).await;
        assert_eq!(counter.count(), 1);
        counter.wait_idle().await;
        release.await.unwrap();
    }
}
