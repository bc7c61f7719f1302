use std::fmt;

#[derive(Debug)]
pub enum MineError {
    UnsupportedProtocol(String),
    RequestTimeout(String),
    AlreadyExists(String),
    Transport(String),
    LeaseExpiredOnAck(String),
    Decompression(String),
    Queue(String),
    Store(String),
    Parse(String),
    Config(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Other(String),
}

impl MineError {
    /// Transient failures that the fixed-budget retry wrappers may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MineError::RequestTimeout(_)
                | MineError::Transport(_)
                | MineError::LeaseExpiredOnAck(_)
                | MineError::Queue(_)
        )
    }
}

impl fmt::Display for MineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MineError::UnsupportedProtocol(e) => write!(f, "Unsupported protocol: {}", e),
            MineError::RequestTimeout(e) => write!(f, "Request timed out: {}", e),
            MineError::AlreadyExists(e) => write!(f, "Already exists: {}", e),
            MineError::Transport(e) => write!(f, "Transport error: {}", e),
            MineError::LeaseExpiredOnAck(e) => write!(f, "Lease expired on ack: {}", e),
            MineError::Decompression(e) => write!(f, "Decompression error: {}", e),
            MineError::Queue(e) => write!(f, "Queue error: {}", e),
            MineError::Store(e) => write!(f, "Store error: {}", e),
            MineError::Parse(e) => write!(f, "Parse error: {}", e),
            MineError::Config(e) => write!(f, "Config error: {}", e),
            MineError::Io(e) => write!(f, "IO error: {}", e),
            MineError::Serialization(e) => write!(f, "Serialization error: {}", e),
            MineError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for MineError {}

impl From<std::io::Error> for MineError {
    fn from(err: std::io::Error) -> Self {
        MineError::Io(err)
    }
}

impl From<serde_json::Error> for MineError {
    fn from(err: serde_json::Error) -> Self {
        MineError::Serialization(err)
    }
}

impl From<tokio::task::JoinError> for MineError {
    fn from(err: tokio::task::JoinError) -> Self {
        MineError::Other(format!("task failed: {}", err))
    }
}

impl From<String> for MineError {
    fn from(err: String) -> Self {
        MineError::Other(err)
    }
}

impl From<&str> for MineError {
    fn from(err: &str) -> Self {
        MineError::Other(err.to_string())
    }
}
