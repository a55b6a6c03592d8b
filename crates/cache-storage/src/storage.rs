//! The set of named buckets under one root directory

use crate::bucket::Bucket;
use crate::error::{CacheError, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Process-wide counters shared by every bucket opened from one storage
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Sequence for temporary file names
    pub writes: AtomicU64,
}

/// Directory-backed cache storage
#[derive(Debug, Clone)]
pub struct CacheStorage {
    root: PathBuf,
    counters: Arc<Counters>,
}

impl CacheStorage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Ensure the root directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(root = ?self.root, "Cache storage initialized");
        Ok(())
    }

    /// Open the named bucket, creating it if absent
    pub async fn open(&self, name: &str) -> Result<Bucket> {
        let dir = self.bucket_dir(name)?;
        fs::create_dir_all(&dir).await?;
        Ok(Bucket::new(name.to_string(), dir, self.counters.clone()))
    }

    pub async fn has(&self, name: &str) -> Result<bool> {
        let dir = self.bucket_dir(name)?;
        match fs::metadata(&dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of every bucket currently on disk, sorted
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let raw = entry.file_name();
            let raw = raw.to_string_lossy();
            match urlencoding::decode(&raw) {
                Ok(name) => names.push(name.into_owned()),
                Err(e) => warn!(dir = %raw, error = %e, "Skipping undecodable bucket directory"),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Delete a bucket and every entry in it. Returns false if it did not exist.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.bucket_dir(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(bucket = %name, "Deleted bucket");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn bucket_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(CacheError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(urlencoding::encode(name).as_ref()))
    }
}
