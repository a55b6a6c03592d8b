//! The worker: lifecycle, interception and messaging behind one handle

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::fetch::{FetchRequest, FetchResponse};
use crate::interceptor::RequestInterceptor;
use crate::lifecycle::{LifecycleManager, LifecycleState};
use crate::messages::{ControlMessage, MessageChannel, Notification};
use crate::network::Network;
use cache_storage::{CacheStats, CacheStorage};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct OfflineWorker {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    lifecycle: LifecycleManager,
    interceptor: RequestInterceptor,
    messages: MessageChannel,
}

impl OfflineWorker {
    pub fn new(config: WorkerConfig, storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        let config = Arc::new(config);
        Self {
            lifecycle: LifecycleManager::new(config.clone(), storage.clone(), network.clone()),
            interceptor: RequestInterceptor::new(config.clone(), storage.clone(), network.clone()),
            messages: MessageChannel::new(config.clone(), storage.clone(), network),
            config,
            storage,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    /// Install then activate, the way a freshly registered worker with
    /// skip-waiting and immediate claim comes up
    pub async fn start(&self) -> Result<()> {
        self.lifecycle.install().await?;
        self.lifecycle.activate().await?;
        Ok(())
    }

    pub async fn install(&self) -> Result<()> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self) -> Result<Vec<String>> {
        self.lifecycle.activate().await
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.lifecycle.ensure_active().await?;
        self.interceptor.handle(request).await
    }

    pub async fn post_message(&self, message: ControlMessage) -> Result<()> {
        self.lifecycle.ensure_active().await?;
        self.messages.handle(message).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.messages.subscribe()
    }

    /// Statistics of the current bucket
    pub async fn stats(&self) -> Result<CacheStats> {
        let bucket = self.storage.open(&self.config.cache_name).await?;
        Ok(bucket.stats().await?)
    }
}
