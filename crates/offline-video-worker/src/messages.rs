//! Control messages from pages and notifications back to them

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::fetch::FetchRequest;
use crate::network::Network;
use cache_storage::CacheStorage;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A message a page may post to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Fetch and store the whole video for offline playback
    CacheVideo,
}

impl FromStr for ControlMessage {
    type Err = WorkerError;

    /// Accepts the bare message or a JSON string (`"cacheVideo"`)
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let unquoted = trimmed
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or(trimmed);
        match unquoted {
            "cacheVideo" => Ok(ControlMessage::CacheVideo),
            _ => Err(WorkerError::UnknownMessage(trimmed.to_string())),
        }
    }
}

/// A notification broadcast to every connected page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Notification {
    #[serde(rename = "videoReady")]
    VideoReady,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::VideoReady => write!(f, "videoReady"),
        }
    }
}

pub struct MessageChannel {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    network: Arc<dyn Network>,
    notifications: broadcast::Sender<Notification>,
}

impl MessageChannel {
    pub fn new(config: Arc<WorkerConfig>, storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        let (notifications, _) = broadcast::channel(16);
        Self {
            config,
            storage,
            network,
            notifications,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub async fn handle(&self, message: ControlMessage) -> Result<()> {
        match message {
            ControlMessage::CacheVideo => self.cache_video().await,
        }
    }

    async fn cache_video(&self) -> Result<()> {
        let bucket = self.storage.open(&self.config.cache_name).await?;
        let key = self.config.video_key();

        if bucket.contains(&key).await? {
            info!(url = %self.config.video_url, "Video already cached");
        } else {
            info!(url = %self.config.video_url, "Caching video");
            let response = self
                .network
                .fetch(&FetchRequest::get(self.config.video_url.clone()))
                .await?;
            if !response.status.is_success() {
                return Err(WorkerError::Network(format!(
                    "video fetch returned status {}",
                    response.status
                )));
            }
            let size = response.body.len();
            bucket.put(&key, &response.into_cached()).await?;
            info!(size, "Video cached");
        }

        self.notify(Notification::VideoReady);
        Ok(())
    }

    fn notify(&self, notification: Notification) {
        match self.notifications.send(notification) {
            Ok(receivers) => debug!(%notification, receivers, "Broadcast notification"),
            Err(_) => debug!(%notification, "No pages listening for notification"),
        }
    }
}
