//! A single named bucket of stored responses

use crate::entry::{self, EntryHeader};
use crate::error::Result;
use crate::storage::Counters;
use crate::types::{CacheStats, CachedResponse, RequestKey};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

const ENTRY_EXT: &str = "entry";

/// Handle to one bucket directory
#[derive(Debug, Clone)]
pub struct Bucket {
    name: String,
    dir: PathBuf,
    counters: Arc<Counters>,
}

impl Bucket {
    pub(crate) fn new(name: String, dir: PathBuf, counters: Arc<Counters>) -> Self {
        Self {
            name,
            dir,
            counters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(format!("{}.{}", key.digest(), ENTRY_EXT))
    }

    /// Look up a stored response, counting the hit or miss
    pub async fn match_request(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let found = self.read(key).await?;
        if found.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(bucket = %self.name, key = %key, "Cache hit");
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(bucket = %self.name, key = %key, "Cache miss");
        }
        Ok(found)
    }

    /// Whether an entry exists, without reading its body or touching counters
    pub async fn contains(&self, key: &RequestKey) -> Result<bool> {
        match entry::read_header(&self.entry_path(key)).await {
            Ok(header) => Ok(header.key() == *key),
            Err(crate::CacheError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => {
                warn!(bucket = %self.name, key = %key, error = %e, "Unreadable cache entry");
                Ok(false)
            }
        }
    }

    async fn read(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match entry::decode(raw) {
            Ok((header, response)) if header.key() == *key => Ok(Some(response)),
            Ok((header, _)) => {
                warn!(bucket = %self.name, key = %key, stored = %header.key(), "Digest collision, ignoring entry");
                Ok(None)
            }
            Err(e) => {
                warn!(bucket = %self.name, key = %key, error = %e, "Failed to decode cached entry, removing it");
                let _ = fs::remove_file(&path).await;
                Ok(None)
            }
        }
    }

    /// Store a response, replacing any previous entry for the same key.
    ///
    /// The entry is written to a temporary file and renamed into place, so
    /// concurrent readers observe either the old or the new entry.
    pub async fn put(&self, key: &RequestKey, response: &CachedResponse) -> Result<()> {
        let encoded = entry::encode(key, response)?;
        let seq = self.counters.writes.fetch_add(1, Ordering::Relaxed);
        let digest = key.digest();
        let tmp = self.dir.join(format!("{}.{}.tmp", digest, seq));
        let path = self.entry_path(key);

        fs::write(&tmp, &encoded).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(bucket = %self.name, key = %key, size = response.len(), "Stored response");
        Ok(())
    }

    /// Remove an entry. Returns false if it was not present.
    pub async fn delete(&self, key: &RequestKey) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn headers(&self) -> Result<Vec<EntryHeader>> {
        let mut headers = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            match entry::read_header(&path).await {
                Ok(header) => headers.push(header),
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable cache entry"),
            }
        }

        Ok(headers)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let headers = self.headers().await?;
        Ok(CacheStats {
            entries: headers.len(),
            total_size: headers.iter().map(|h| h.size).sum(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        })
    }
}
