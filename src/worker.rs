use crate::MineError;
use crate::archive_cache::ArchiveCache;
use crate::config::{RECORD_CHANNEL_CAPACITY, WorkerConfig};
use crate::digester::{DigestMode, DigestOutcome, PageDigester};
use crate::heuristic::Heuristic;
use crate::language::LanguageFilterLike;
use crate::page::{Page, Record};
use crate::pending::PendingCounter;
use crate::queue::{QueueBackendLike, WorkItem, WorkQueueClient};
use crate::store::PageStoreLike;
use crate::warc::{RecordParserLike, WetReader};
use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Leasing,
    Fetching,
    StreamingRecords,
    Finalizing,
    AckedIdle,
    FatalExit,
}

/// Per-archive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub records: usize,
    pub web_pages: usize,
    pub digested: usize,
    pub prefiltered: usize,
    pub accepted: usize,
    pub language_rejected: usize,
    pub stored: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub archives: usize,
    pub totals: ArchiveStats,
}

impl RunSummary {
    pub fn absorb(&mut self, stats: &ArchiveStats) {
        self.archives += 1;
        let t = &mut self.totals;
        t.records += stats.records;
        t.web_pages += stats.web_pages;
        t.digested += stats.digested;
        t.prefiltered += stats.prefiltered;
        t.accepted += stats.accepted;
        t.language_rejected += stats.language_rejected;
        t.stored += stats.stored;
    }

    pub fn merge(&mut self, other: &RunSummary) {
        let archives = self.archives;
        self.absorb(&other.totals);
        self.archives = archives + other.archives;
    }
}

#[derive(Debug, Default)]
struct ArchiveCounters {
    records: AtomicUsize,
    web_pages: AtomicUsize,
    digested: AtomicUsize,
    prefiltered: AtomicUsize,
    accepted: AtomicUsize,
    language_rejected: AtomicUsize,
    stored: AtomicUsize,
    failures: AtomicUsize,
}

impl ArchiveCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ArchiveStats {
        ArchiveStats {
            records: self.records.load(Ordering::SeqCst),
            web_pages: self.web_pages.load(Ordering::SeqCst),
            digested: self.digested.load(Ordering::SeqCst),
            prefiltered: self.prefiltered.load(Ordering::SeqCst),
            accepted: self.accepted.load(Ordering::SeqCst),
            language_rejected: self.language_rejected.load(Ordering::SeqCst),
            stored: self.stored.load(Ordering::SeqCst),
        }
    }
}

#[derive(Clone)]
struct LanguageGate {
    filter: Arc<dyn LanguageFilterLike>,
    codes: Vec<String>,
}

/// Everything one record needs, shared by the record tasks of an archive.
struct RecordPipeline<S> {
    digester: PageDigester,
    heuristic: Heuristic,
    language: Option<LanguageGate>,
    store: Arc<S>,
    counters: ArchiveCounters,
}

impl<S: PageStoreLike + 'static> RecordPipeline<S> {
    async fn handle(&self, record: Record) -> Result<(), MineError> {
        let page = Page::from(record);
        if !page.is_web_page() {
            return Ok(());
        }
        ArchiveCounters::bump(&self.counters.web_pages);

        let digester = self.digester.clone();
        let (page, outcome) = tokio::task::spawn_blocking(move || {
            let mut page = page;
            let outcome = digester.digest_with_outcome(&mut page, DigestMode::Overwrite).1;
            (page, outcome)
        })
        .await?;
        match outcome {
            DigestOutcome::Prefiltered => {
                ArchiveCounters::bump(&self.counters.prefiltered);
                return Ok(());
            }
            DigestOutcome::NoMatcher => return Ok(()),
            DigestOutcome::Matched => ArchiveCounters::bump(&self.counters.digested),
        }

        if !self.heuristic.accepts(&page) {
            return Ok(());
        }
        ArchiveCounters::bump(&self.counters.accepted);
        let score = self.heuristic.score(&page);

        if let Some(gate) = &self.language {
            let in_language = gate.filter.is_in_language(&page.content, &gate.codes).unwrap_or_else(|e| {
                debug!(uri = page.target_uri().unwrap_or("-"), error = %e, "language detection failed, rejecting page");
                false
            });
            if !in_language {
                ArchiveCounters::bump(&self.counters.language_rejected);
                return Ok(());
            }
        }

        self.store.store(&page, score).await?;
        ArchiveCounters::bump(&self.counters.stored);
        Ok(())
    }
}

/// Leases archives until the queue is drained: fetch, parse, digest, gate,
/// store, then flush and ack. Any fetch, parse or finalize failure is fatal
/// and leaves the item to reappear after its visibility timeout.
pub struct Worker<Q, S> {
    id: usize,
    queue: WorkQueueClient<Q>,
    cache: Arc<ArchiveCache>,
    digester: PageDigester,
    heuristic: Heuristic,
    language: Option<LanguageGate>,
    store: Arc<S>,
    use_caching: bool,
    visibility_timeout: Duration,
    max_in_flight_records: usize,
    state: watch::Sender<WorkerState>,
}

impl<Q, S> Worker<Q, S>
where
    Q: QueueBackendLike + 'static,
    S: PageStoreLike + 'static,
{
    pub fn new(
        queue: WorkQueueClient<Q>,
        cache: Arc<ArchiveCache>,
        digester: PageDigester,
        store: Arc<S>,
        config: &WorkerConfig,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            id: 0,
            queue,
            cache,
            digester,
            heuristic: Heuristic::new(config.threshold),
            language: None,
            store,
            use_caching: config.use_caching,
            visibility_timeout: config.visibility_timeout,
            max_in_flight_records: config.max_in_flight_records.max(1),
            state,
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// Pages must also be written in one of `codes`. An empty list disables
    /// the gate.
    pub fn with_language_filter(mut self, filter: Arc<dyn LanguageFilterLike>, codes: Vec<String>) -> Self {
        self.language = if codes.is_empty() { None } else { Some(LanguageGate { filter, codes }) };
        self
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn enter(&self, state: WorkerState) {
        debug!(worker = self.id, ?state, "state change");
        self.state.send_replace(state);
    }

    #[instrument(skip(self), fields(worker = self.id))]
    pub async fn run(&self) -> Result<RunSummary, MineError> {
        let mut summary = RunSummary::default();
        loop {
            self.enter(WorkerState::Leasing);
            let leased = match self.queue.lease(self.visibility_timeout).await {
                Ok(leased) => leased,
                Err(e) => return Err(self.fatal(None, e)),
            };
            let Some(item) = leased else {
                self.enter(WorkerState::Idle);
                info!(archives = summary.archives, stored = summary.totals.stored, "queue drained");
                return Ok(summary);
            };
            match self.process(&item).await {
                Ok(stats) => {
                    summary.absorb(&stats);
                    self.enter(WorkerState::AckedIdle);
                }
                Err(e) => return Err(self.fatal(Some(&item), e)),
            }
        }
    }

    fn fatal(&self, item: Option<&WorkItem>, e: MineError) -> MineError {
        self.enter(WorkerState::FatalExit);
        match item {
            Some(item) => error!(id = item.id, archive = %item.payload, error = %e, "fatal error, archive left unacknowledged"),
            None => error!(error = %e, "fatal queue error"),
        }
        e
    }

    /// Runs one leased archive to completion and acknowledges it.
    pub async fn process(&self, item: &WorkItem) -> Result<ArchiveStats, MineError> {
        let started = Instant::now();
        info!(id = item.id, archive = %item.payload, "processing archive");
        self.enter(WorkerState::Fetching);

        let pipeline = Arc::new(RecordPipeline {
            digester: self.digester.clone(),
            heuristic: self.heuristic,
            language: self.language.clone(),
            store: Arc::clone(&self.store),
            counters: ArchiveCounters::default(),
        });

        let (tx, mut rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let cache = Arc::clone(&self.cache);
        let path = item.payload.clone();
        let use_caching = self.use_caching;
        let reader = tokio::task::spawn_blocking(move || stream_records(&cache, &path, use_caching, tx));

        let pending = PendingCounter::new();
        let mut streaming = false;
        while let Some(record) = rx.recv().await {
            if !streaming {
                streaming = true;
                self.enter(WorkerState::StreamingRecords);
            }
            ArchiveCounters::bump(&pipeline.counters.records);
            pending.wait_below(self.max_in_flight_records).await;
            let guard = pending.enter();
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                if let Err(e) = pipeline.handle(record).await {
                    error!(error = %e, "record processing failed");
                    ArchiveCounters::bump(&pipeline.counters.failures);
                }
                drop(guard);
            });
        }

        let parsed = reader.await;
        pending.wait_idle().await;
        parsed??;

        self.enter(WorkerState::Finalizing);
        let failures = pipeline.counters.failures.load(Ordering::SeqCst);
        if failures > 0 {
            return Err(MineError::Store(format!("{} record(s) failed in {}", failures, item.payload)));
        }
        self.store.flush().await?;
        self.queue.ack(item).await?;

        let stats = pipeline.counters.snapshot();
        info!(
            archive = %item.payload,
            records = stats.records,
            web_pages = stats.web_pages,
            digested = stats.digested,
            prefiltered = stats.prefiltered,
            accepted = stats.accepted,
            language_rejected = stats.language_rejected,
            stored = stats.stored,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "archive finished"
        );
        Ok(stats)
    }
}

/// Blocking half of an archive: resolve, decompress and parse, handing each
/// record to the async side. Returns the number of records parsed.
fn stream_records(
    cache: &ArchiveCache,
    path: &str,
    use_caching: bool,
    tx: mpsc::Sender<Record>,
) -> Result<usize, MineError> {
    let stream = cache.resolve(path, use_caching)?;
    let mut parser = WetReader::new(BufReader::new(stream));
    while let Some(record) = parser.next_record()? {
        if tx.blocking_send(record).is_err() {
            warn!(archive = path, "record consumer closed early");
            return Err(MineError::Other(format!("record consumer closed while reading {}", path)));
        }
    }
    Ok(parser.records_read())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_accumulates() {
        let mut summary = RunSummary::default();
        let stats = ArchiveStats { records: 10, web_pages: 8, digested: 5, prefiltered: 3, accepted: 2, language_rejected: 1, stored: 1 };
        summary.absorb(&stats);
        summary.absorb(&stats);
        assert_eq!(summary.archives, 2);
        assert_eq!(summary.totals.records, 20);
        assert_eq!(summary.totals.stored, 2);

        let mut other = RunSummary::default();
        other.absorb(&stats);
        summary.merge(&other);
        assert_eq!(summary.archives, 3);
        assert_eq!(summary.totals.web_pages, 24);
    }
}
