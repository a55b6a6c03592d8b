//! Error types for the offline video worker

use crate::lifecycle::LifecycleState;
use std::fmt;

#[derive(Debug)]
pub enum WorkerError {
    Cache(cache_storage::CacheError),
    Http(Box<reqwest::Error>),
    Network(String),
    InstallFailed {
        url: String,
        reason: String,
    },
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },
    UnknownMessage(String),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Cache(err) => write!(f, "Cache error: {}", err),
            WorkerError::Http(err) => write!(f, "HTTP error: {}", err),
            WorkerError::Network(msg) => write!(f, "Network error: {}", msg),
            WorkerError::InstallFailed { url, reason } => {
                write!(f, "Install failed: could not precache {}: {}", url, reason)
            }
            WorkerError::InvalidState { expected, actual } => write!(
                f,
                "Invalid lifecycle state: expected {}, got {}",
                expected, actual
            ),
            WorkerError::UnknownMessage(msg) => write!(f, "Unknown message: {:?}", msg),
            WorkerError::Io(err) => write!(f, "IO error: {}", err),
            WorkerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Cache(err) => Some(err),
            WorkerError::Http(err) => Some(err.as_ref()),
            WorkerError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<cache_storage::CacheError> for WorkerError {
    fn from(err: cache_storage::CacheError) -> Self {
        WorkerError::Cache(err)
    }
}

impl From<reqwest::Error> for WorkerError {
    fn from(err: reqwest::Error) -> Self {
        WorkerError::Http(Box::new(err))
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Io(Box::new(err))
    }
}

impl From<url::ParseError> for WorkerError {
    fn from(err: url::ParseError) -> Self {
        WorkerError::Config(format!("invalid URL: {}", err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for WorkerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        WorkerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
