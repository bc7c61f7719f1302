pub mod archive_cache;
pub mod bloom_filter;
pub mod config;
pub mod digester;
pub mod downloader;
pub mod error;
pub mod heuristic;
pub mod language;
pub mod matcher;
pub mod page;
pub mod pending;
pub mod populate;
#[cfg(feature = "distributed")]
pub mod postgres_queue;
pub mod prefix_tree;
pub mod queue;
pub mod retry;
pub mod splitter;
pub mod store;
pub mod telemetry;
pub mod term;
pub mod warc;
pub mod worker;

pub use error::*;
