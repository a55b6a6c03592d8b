//! Install / activate lifecycle of the current cache version

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::fetch::{FetchRequest, FetchResponse};
use crate::network::Network;
use cache_storage::{Bucket, CacheStorage, RequestKey};
use futures::future::try_join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle states. The only path is `Installing -> Activating -> Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installing,
    Activating,
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::Activating => write!(f, "activating"),
            LifecycleState::Active => write!(f, "active"),
        }
    }
}

/// Owns the current bucket's population and the purge of stale ones
pub struct LifecycleManager {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    network: Arc<dyn Network>,
    state: RwLock<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(config: Arc<WorkerConfig>, storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        Self {
            config,
            storage,
            network,
            state: RwLock::new(LifecycleState::Installing),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn ensure_active(&self) -> Result<()> {
        let actual = self.state().await;
        if actual != LifecycleState::Active {
            return Err(WorkerError::InvalidState {
                expected: LifecycleState::Active,
                actual,
            });
        }
        Ok(())
    }

    /// Precache every listed asset into the current bucket, all or nothing.
    ///
    /// On failure the state stays `Installing` and nothing fetched by this
    /// attempt remains in the bucket.
    pub async fn install(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != LifecycleState::Installing {
            return Err(WorkerError::InvalidState {
                expected: LifecycleState::Installing,
                actual: *state,
            });
        }

        info!(cache = %self.config.cache_name, assets = self.config.precache.len(), "Installing");
        let bucket = self.storage.open(&self.config.cache_name).await?;

        if self.is_installed(&bucket).await? {
            info!(cache = %self.config.cache_name, "Current version already precached");
        } else {
            self.precache(&bucket).await?;
            info!(cache = %self.config.cache_name, "Precache complete");
        }

        *state = LifecycleState::Activating;
        Ok(())
    }

    async fn is_installed(&self, bucket: &Bucket) -> Result<bool> {
        for key in self.config.precache_keys() {
            if !bucket.contains(&key).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn precache(&self, bucket: &Bucket) -> Result<()> {
        let fetched = try_join_all(
            self.config
                .precache
                .iter()
                .map(|url| self.fetch_asset(url.clone())),
        )
        .await?;

        let mut written: Vec<RequestKey> = Vec::with_capacity(fetched.len());
        for (key, response) in fetched {
            if let Err(e) = bucket.put(&key, &response.into_cached()).await {
                warn!(key = %key, error = %e, "Failed to store precached asset, rolling back");
                let left = rollback(bucket, &written).await;
                if !left.is_empty() {
                    warn!(bucket = %bucket.name(), left = left.len(), "Rollback incomplete, partial precache remains");
                }
                return Err(e.into());
            }
            written.push(key);
        }
        Ok(())
    }

    async fn fetch_asset(&self, url: Url) -> Result<(RequestKey, FetchResponse)> {
        let request = FetchRequest::get(url);
        let response =
            self.network
                .fetch(&request)
                .await
                .map_err(|e| WorkerError::InstallFailed {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                })?;

        if !response.status.is_success() {
            return Err(WorkerError::InstallFailed {
                url: request.url.to_string(),
                reason: format!("status {}", response.status),
            });
        }

        debug!(url = %request.url, size = response.body.len(), "Fetched precache asset");
        Ok((request.key(), response))
    }

    /// Delete every bucket but the current one and take control.
    /// Returns the names of the deleted buckets.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        if *state != LifecycleState::Activating {
            return Err(WorkerError::InvalidState {
                expected: LifecycleState::Activating,
                actual: *state,
            });
        }

        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name == self.config.cache_name {
                continue;
            }
            if self.storage.delete(&name).await? {
                info!(cache = %name, "Deleted stale cache");
                deleted.push(name);
            }
        }

        *state = LifecycleState::Active;
        info!(cache = %self.config.cache_name, stale = deleted.len(), "Activated");
        Ok(deleted)
    }
}

/// Remove entries written by a failed precache, returning any left behind
async fn rollback(bucket: &Bucket, written: &[RequestKey]) -> Vec<RequestKey> {
    let mut left = Vec::new();
    for key in written {
        if let Err(e) = bucket.delete(key).await {
            warn!(key = %key, error = %e, "Failed to remove precached asset");
            left.push(key.clone());
        }
    }
    left
}
