use crate::MineError;
use std::path::PathBuf;
use std::time::Duration;

pub const QUEUE_MAX_RETRIES: usize = 5;
pub const QUEUE_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DOWNLOAD_MAX_RETRIES: usize = 5;
pub const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(60);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(1800);
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.1;
/// Tokens shorter than this never enter the pre-filter.
pub const MIN_TOKEN_LENGTH: usize = 3;
pub const DEFAULT_THRESHOLD: usize = 3;
pub const POPULATE_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_POPULATE_CONCURRENCY: usize = 16;
pub const RECORD_CHANNEL_CAPACITY: usize = 256;
/// Records of one archive being digested or stored at the same time.
pub const MAX_IN_FLIGHT_RECORDS: usize = 64;
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://data.commoncrawl.org";
pub const DEFAULT_QUEUE_NAME: &str = "wet_paths";

/// Fixed-budget retry: up to `max_retries` further attempts, `delay` apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn queue() -> Self {
        Self::new(QUEUE_MAX_RETRIES, QUEUE_RETRY_DELAY)
    }

    pub fn download() -> Self {
        Self::new(DOWNLOAD_MAX_RETRIES, DOWNLOAD_RETRY_DELAY)
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Everything a worker process receives once at start.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub terms_path: PathBuf,
    pub cache_dir: PathBuf,
    pub use_caching: bool,
    pub base_url: String,
    pub threshold: usize,
    pub languages: Option<Vec<String>>,
    pub visibility_timeout: Duration,
    pub queue_name: String,
    pub worker_tasks: usize,
    pub max_in_flight_records: usize,
    pub use_prefilter: bool,
    pub false_positive_rate: f64,
    pub output_path: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            terms_path: PathBuf::from("./terms.json"),
            cache_dir: PathBuf::from("./mine_state/cache"),
            use_caching: true,
            base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            threshold: DEFAULT_THRESHOLD,
            languages: None,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            worker_tasks: 1,
            max_in_flight_records: MAX_IN_FLIGHT_RECORDS,
            use_prefilter: true,
            false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
            output_path: PathBuf::from("./mine_state/pages.jsonl"),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, MineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MINE_TERMS_PATH") {
            config.terms_path = PathBuf::from(v);
        }
        if let Some(v) = get("MINE_CACHE_DIR") {
            config.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MINE_USE_CACHING") {
            config.use_caching = parse_bool("MINE_USE_CACHING", &v)?;
        }
        if let Some(v) = get("MINE_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = get("MINE_THRESHOLD") {
            config.threshold = parse_number("MINE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("MINE_LANGUAGES") {
            let codes: Vec<String> = v
                .split(',')
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect();
            config.languages = if codes.is_empty() { None } else { Some(codes) };
        }
        if let Some(v) = get("MINE_VISIBILITY_TIMEOUT_SECS") {
            config.visibility_timeout =
                Duration::from_secs(parse_number("MINE_VISIBILITY_TIMEOUT_SECS", &v)? as u64);
        }
        if let Some(v) = get("MINE_QUEUE_NAME") {
            config.queue_name = v;
        }
        if let Some(v) = get("MINE_WORKER_TASKS") {
            config.worker_tasks = parse_number("MINE_WORKER_TASKS", &v)?;
        }
        if let Some(v) = get("MINE_MAX_IN_FLIGHT_RECORDS") {
            config.max_in_flight_records = parse_number("MINE_MAX_IN_FLIGHT_RECORDS", &v)?;
        }
        if let Some(v) = get("MINE_USE_PREFILTER") {
            config.use_prefilter = parse_bool("MINE_USE_PREFILTER", &v)?;
        }
        if let Some(v) = get("MINE_FALSE_POSITIVE_RATE") {
            config.false_positive_rate = v.trim().parse::<f64>().map_err(|e| {
                MineError::Config(format!("MINE_FALSE_POSITIVE_RATE={}: {}", v, e))
            })?;
        }
        if let Some(v) = get("MINE_OUTPUT_PATH") {
            config.output_path = PathBuf::from(v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MineError> {
        if self.threshold == 0 {
            return Err(MineError::Config("threshold must be at least 1".to_string()));
        }
        if self.worker_tasks == 0 {
            return Err(MineError::Config("worker task count must be at least 1".to_string()));
        }
        if self.max_in_flight_records == 0 {
            return Err(MineError::Config("in-flight record limit must be at least 1".to_string()));
        }
        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            return Err(MineError::Config(format!(
                "false positive rate must be in (0, 1), got {}",
                self.false_positive_rate
            )));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, MineError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MineError::Config(format!("{}={} is not a boolean", key, other))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize, MineError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| MineError::Config(format!("{}={}: {}", key, value, e)))
}
