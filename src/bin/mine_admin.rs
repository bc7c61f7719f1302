use clap::{Parser, Subcommand};
use crawlmine::MineError;
use crawlmine::config::{DEFAULT_ARCHIVE_BASE_URL, DEFAULT_POPULATE_CONCURRENCY, DEFAULT_QUEUE_NAME, RetryPolicy};
use crawlmine::digester::{DigestMode, PageDigester};
use crawlmine::downloader::HttpDownloader;
use crawlmine::populate::discover_archive_paths;
use crawlmine::postgres_queue::PostgresQueue;
use crawlmine::prefix_tree::PrefixTree;
use crawlmine::queue::WorkQueueClient;
use crawlmine::store::read_stored_pages;
use crawlmine::telemetry::init_tracing;
use crawlmine::term::load_terms;
use dotenv::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "mine_admin")]
#[command(about = "Queue population and progress tooling for crawl mining", long_about = None)]
struct Cli {
    /// Queue name (defaults to MINE_QUEUE_NAME, then wet_paths)
    #[arg(long, global = true)]
    queue: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue every WET archive of a crawl, e.g. CC-MAIN-2024-30
    Populate {
        crawl: String,
        /// Maximum enqueue operations in flight
        #[arg(long, default_value_t = DEFAULT_POPULATE_CONCURRENCY)]
        concurrency: usize,
        /// Only enqueue the first N archives
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show how many archives are still unacknowledged
    Queue,
    /// Re-check stored pages against the current term set
    Audit {
        /// JSONL file written by the worker
        path: PathBuf,
        /// Terms file (defaults to MINE_TERMS_PATH)
        #[arg(long)]
        terms: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    dotenv().ok();
    init_tracing("mine-admin");
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn queue_name(cli: &Cli) -> String {
    cli.queue
        .clone()
        .or_else(|| std::env::var("MINE_QUEUE_NAME").ok())
        .unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string())
}

fn connect_queue(cli: &Cli) -> Result<Arc<PostgresQueue>, MineError> {
    let database_url = std::env::var("MINE_DATABASE_URL")
        .map_err(|_| MineError::Config("MINE_DATABASE_URL is not set".to_string()))?;
    Ok(Arc::new(PostgresQueue::connect(&database_url, &queue_name(cli))?))
}

fn run(cli: Cli) -> Result<(), MineError> {
    match &cli.command {
        Commands::Populate { crawl, concurrency, limit } => {
            let base_url = std::env::var("MINE_BASE_URL").unwrap_or_else(|_| DEFAULT_ARCHIVE_BASE_URL.to_string());
            let downloader = HttpDownloader::new()?;
            let mut paths = discover_archive_paths(&downloader, &base_url, crawl, RetryPolicy::download())?;
            if let Some(limit) = limit {
                paths.truncate(*limit);
            }
            let queue = connect_queue(&cli)?;
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            let client = WorkQueueClient::new(Arc::clone(&queue));
            let report = runtime.block_on(client.populate(paths, *concurrency));
            drop(runtime);
            println!("enqueued {} archive(s), {} failed", report.created, report.failed);
            Ok(())
        }
        Commands::Queue => {
            let queue = connect_queue(&cli)?;
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
            let client = WorkQueueClient::new(Arc::clone(&queue));
            let pending = runtime.block_on(client.pending_count());
            drop(runtime);
            println!("{}: {} archive(s) pending", queue.queue_name(), pending?);
            Ok(())
        }
        Commands::Audit { path, terms } => {
            let terms_path = terms
                .clone()
                .or_else(|| std::env::var("MINE_TERMS_PATH").ok().map(PathBuf::from))
                .ok_or_else(|| MineError::Config("pass --terms or set MINE_TERMS_PATH".to_string()))?;
            let terms = load_terms(&terms_path)?;
            let digester = PageDigester::new(Arc::new(PrefixTree::from_terms(terms)));
            let stored = read_stored_pages(path)?;
            let inconsistent = audit_pages(&digester, stored);
            println!("audited {} page(s), {} inconsistent", inconsistent.0, inconsistent.1);
            Ok(())
        }
    }
}

/// Inconsistencies are data-quality warnings, never errors.
fn audit_pages(digester: &PageDigester, stored: Vec<crawlmine::store::StoredPage>) -> (usize, usize) {
    let total = stored.len();
    let mut inconsistent = 0;
    for entry in stored {
        let mut page = entry.page.clone();
        digester.digest(&mut page, DigestMode::Overwrite);
        let missing: Vec<&str> = entry
            .page
            .occurrences
            .iter()
            .filter(|o| !page.occurrences.iter().any(|fresh| fresh.term == o.term))
            .map(|o| o.term.value.as_str())
            .collect();
        if !missing.is_empty() {
            inconsistent += 1;
            warn!(
                key = %entry.key,
                uri = entry.page.target_uri().unwrap_or("-"),
                missing = ?missing,
                "stored page no longer contains its recorded terms"
            );
        }
    }
    info!(total, inconsistent, "audit finished");
    (total, inconsistent)
}
