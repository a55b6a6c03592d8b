//! Error types for cache storage

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Io(Box<std::io::Error>),
    Serialization(Box<serde_json::Error>),
    CorruptEntry(String),
    InvalidName(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Serialization(err) => write!(f, "Serialization error: {}", err),
            CacheError::CorruptEntry(msg) => write!(f, "Corrupt cache entry: {}", msg),
            CacheError::InvalidName(name) => write!(f, "Invalid bucket name: {:?}", name),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Serialization(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
