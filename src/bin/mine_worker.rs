use crawlmine::MineError;
use crawlmine::archive_cache::ArchiveCache;
use crawlmine::bloom_filter::TokenPreFilter;
use crawlmine::config::WorkerConfig;
use crawlmine::digester::PageDigester;
use crawlmine::downloader::HttpDownloader;
use crawlmine::language::StopwordLanguageFilter;
use crawlmine::postgres_queue::PostgresQueue;
use crawlmine::prefix_tree::PrefixTree;
use crawlmine::queue::WorkQueueClient;
use crawlmine::store::{JsonlPageStore, PageStoreLike, S3PageStore};
use crawlmine::telemetry::init_tracing;
use crawlmine::term::load_terms;
use crawlmine::worker::{RunSummary, Worker};
use dotenv::dotenv;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

fn main() -> ExitCode {
    dotenv().ok();
    init_tracing("mine-worker");
    match run() {
        Ok(summary) => {
            info!(
                archives = summary.archives,
                records = summary.totals.records,
                accepted = summary.totals.accepted,
                stored = summary.totals.stored,
                "all worker loops drained the queue"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "worker exiting after fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Blocking clients (postgres, reqwest) are built and dropped here, outside
/// the runtime.
fn run() -> Result<RunSummary, MineError> {
    let config = WorkerConfig::from_env()?;
    let terms = load_terms(&config.terms_path)?;
    info!(terms = terms.len(), path = %config.terms_path.display(), "loaded terms");

    let mut digester = PageDigester::new(Arc::new(PrefixTree::from_terms(terms.iter().cloned())));
    if config.use_prefilter {
        let prefilter = TokenPreFilter::with_fp_rate(&terms, config.false_positive_rate);
        info!(tokens = prefilter.token_count(), "built token pre-filter");
        digester = digester.with_prefilter(Arc::new(prefilter));
    }

    let database_url = std::env::var("MINE_DATABASE_URL")
        .map_err(|_| MineError::Config("MINE_DATABASE_URL is not set".to_string()))?;
    let queue = Arc::new(PostgresQueue::connect(&database_url, &config.queue_name)?);
    let cache = Arc::new(ArchiveCache::new(
        Arc::new(HttpDownloader::new()?),
        &config.cache_dir,
        &config.base_url,
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(async {
        if std::env::var("MINE_S3_BUCKET").is_ok() {
            let store = Arc::new(S3PageStore::from_env().await?);
            run_pool(&config, Arc::clone(&queue), Arc::clone(&cache), digester, store).await
        } else {
            let store = Arc::new(JsonlPageStore::open(&config.output_path)?);
            run_pool(&config, Arc::clone(&queue), Arc::clone(&cache), digester, store).await
        }
    });
    drop(runtime);
    result
}

/// Runs `worker_tasks` independent loops. The first fatal error aborts the
/// rest; their leases lapse and the items return to the queue.
async fn run_pool<S: PageStoreLike + 'static>(
    config: &WorkerConfig,
    queue: Arc<PostgresQueue>,
    cache: Arc<ArchiveCache>,
    digester: PageDigester,
    store: Arc<S>,
) -> Result<RunSummary, MineError> {
    let language = Arc::new(StopwordLanguageFilter::new());
    let mut loops = JoinSet::new();
    for id in 0..config.worker_tasks {
        let mut worker = Worker::new(
            WorkQueueClient::new(Arc::clone(&queue)),
            Arc::clone(&cache),
            digester.clone(),
            Arc::clone(&store),
            config,
        )
        .with_id(id);
        if let Some(codes) = &config.languages {
            worker = worker.with_language_filter(language.clone(), codes.clone());
        }
        loops.spawn(async move { worker.run().await });
    }
    info!(tasks = config.worker_tasks, "worker loops started");

    let mut summary = RunSummary::default();
    while let Some(joined) = loops.join_next().await {
        match joined {
            Ok(Ok(loop_summary)) => summary.merge(&loop_summary),
            Ok(Err(e)) => {
                loops.abort_all();
                return Err(e);
            }
            Err(e) => {
                loops.abort_all();
                return Err(e.into());
            }
        }
    }
    Ok(summary)
}
