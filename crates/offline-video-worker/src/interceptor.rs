//! Per-request routing between the current bucket and the network

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::fetch::{Destination, FetchRequest, FetchResponse};
use crate::network::Network;
use crate::range::{self, Slice};
use axum::http::Method;
use cache_storage::{Bucket, CacheStorage};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RequestInterceptor {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    network: Arc<dyn Network>,
}

impl RequestInterceptor {
    pub fn new(config: Arc<WorkerConfig>, storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        Self {
            config,
            storage,
            network,
        }
    }

    /// Answer one outgoing request.
    ///
    /// Only a Range request for an uncached video with the network down can
    /// fail; everything else falls back to the cache or a `503`.
    pub async fn handle(&self, request: &FetchRequest) -> Result<FetchResponse> {
        if request.method != Method::GET {
            debug!(method = %request.method, url = %request.url, "Passing through non-GET request");
            return self.network.fetch(request).await;
        }

        let bucket = self.storage.open(&self.config.cache_name).await?;

        if let Some(range) = request.range() {
            if self.config.is_video(&request.url) {
                return self.serve_range(&bucket, request, range).await;
            }
        }

        self.cache_first(&bucket, request).await
    }

    async fn serve_range(
        &self,
        bucket: &Bucket,
        request: &FetchRequest,
        range: &str,
    ) -> Result<FetchResponse> {
        let video_key = self.config.video_key();
        let cached = bucket.match_request(&video_key).await?;

        if let Some(response) = range::slice(cached.as_ref(), Some(range)).into_response() {
            debug!(range, status = %response.status, "Served range from cache");
            return Ok(response);
        }

        debug!(range, "Video not cached, streaming range from network");
        match self.network.fetch(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(error = %e, "Range fetch failed, trying full cached video");
                match bucket.match_request(&video_key).await? {
                    Some(full) => Ok(range::full(&full)),
                    None => Err(e),
                }
            }
        }
    }

    async fn cache_first(&self, bucket: &Bucket, request: &FetchRequest) -> Result<FetchResponse> {
        let key = request.key();
        if let Some(cached) = bucket.match_request(&key).await? {
            return Ok(FetchResponse::from(cached));
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    let copy = response.duplicate();
                    if let Err(e) = bucket.put(&key, &copy.into_cached()).await {
                        // Serve the response even if it could not be stored
                        warn!(key = %key, error = %e, "Failed to cache network response");
                    }
                }
                Ok(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, using offline fallback");
                self.offline_fallback(bucket, request).await
            }
        }
    }

    async fn offline_fallback(
        &self,
        bucket: &Bucket,
        request: &FetchRequest,
    ) -> Result<FetchResponse> {
        let fallback_key = match request.destination {
            Destination::Document => Some(self.config.entry_key()),
            Destination::Video => Some(self.config.video_key()),
            Destination::Other => None,
        };

        if let Some(key) = fallback_key {
            if let Some(cached) = bucket.match_request(&key).await? {
                return Ok(FetchResponse::from(cached));
            }
        }
        Ok(FetchResponse::offline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::fetch::ResponseKind;
    use crate::network::mock::MockNetwork;
    use axum::http::header::{self, HeaderName, HeaderValue};
    use axum::http::StatusCode;
    use cache_storage::{CachedResponse, RequestKey};
    use tempfile::{tempdir, TempDir};
    use url::Url;

    const ORIGIN: &str = "http://localhost:8080/";
    const VIDEO: &str = "http://localhost:8080/video.mp4";
    const INDEX: &str = "http://localhost:8080/index.html";

    struct Harness {
        _dir: TempDir,
        storage: CacheStorage,
        network: Arc<MockNetwork>,
        interceptor: RequestInterceptor,
    }

    fn harness(network: MockNetwork) -> Harness {
        let dir = tempdir().unwrap();
        let storage = CacheStorage::new(dir.path().to_path_buf());
        let config = Arc::new(
            WorkerConfig::new(
                Url::parse(ORIGIN).unwrap(),
                "v1",
                crate::config::DEFAULT_PRECACHE,
                "./video.mp4",
                "./index.html",
            )
            .unwrap(),
        );
        let network = Arc::new(network);
        let interceptor = RequestInterceptor::new(config, storage.clone(), network.clone());
        Harness {
            _dir: dir,
            storage,
            network,
            interceptor,
        }
    }

    fn video_body() -> Vec<u8> {
        (0..10_000u32).map(|i| (i % 256) as u8).collect()
    }

    async fn seed(storage: &CacheStorage, url: &str, content_type: &str, body: Vec<u8>) {
        let bucket = storage.open("v1").await.unwrap();
        bucket
            .put(
                &RequestKey::get(url),
                &CachedResponse::new(
                    200,
                    vec![("content-type".to_string(), content_type.to_string())],
                    body,
                ),
            )
            .await
            .unwrap();
    }

    fn get(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap())
    }

    fn ranged(url: &str, range: &'static str) -> FetchRequest {
        get(url).with_header(header::RANGE, HeaderValue::from_static(range))
    }

    fn navigation(url: &str) -> FetchRequest {
        get(url).with_header(
            HeaderName::from_static("sec-fetch-dest"),
            HeaderValue::from_static("document"),
        )
    }

    #[tokio::test]
    async fn test_cache_hit_never_touches_network() {
        let h = harness(MockNetwork::new().route(INDEX, "text/html", "network copy"));
        seed(&h.storage, INDEX, "text/html", b"cached copy".to_vec()).await;

        let response = h.interceptor.handle(&get(INDEX)).await.unwrap();
        assert_eq!(&response.body[..], b"cached copy");
        assert!(h.network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let h = harness(MockNetwork::new().route(
            "http://localhost:8080/app.js",
            "text/javascript",
            "console.log(1)",
        ));

        let response = h
            .interceptor
            .handle(&get("http://localhost:8080/app.js"))
            .await
            .unwrap();
        assert_eq!(&response.body[..], b"console.log(1)");

        // Second request is served from the bucket
        h.network.reset_calls();
        let response = h
            .interceptor
            .handle(&get("http://localhost:8080/app.js"))
            .await
            .unwrap();
        assert_eq!(&response.body[..], b"console.log(1)");
        assert_eq!(response.header("content-type"), Some("text/javascript"));
        assert!(h.network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_uncacheable_responses_are_not_stored() {
        let h = harness(
            MockNetwork::new()
                .route_with(
                    "http://cdn.example.com/lib.js",
                    StatusCode::OK,
                    "text/javascript",
                    "lib",
                    ResponseKind::Opaque,
                )
                .route_with(
                    "http://localhost:8080/missing",
                    StatusCode::NOT_FOUND,
                    "text/plain",
                    "nope",
                    ResponseKind::Basic,
                ),
        );

        let opaque = h
            .interceptor
            .handle(&get("http://cdn.example.com/lib.js"))
            .await
            .unwrap();
        assert_eq!(opaque.status, StatusCode::OK);

        let missing = h
            .interceptor
            .handle(&get("http://localhost:8080/missing"))
            .await
            .unwrap();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let bucket = h.storage.open("v1").await.unwrap();
        assert_eq!(bucket.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let h = harness(MockNetwork::new().route(INDEX, "text/html", "posted"));
        seed(&h.storage, INDEX, "text/html", b"cached".to_vec()).await;

        let mut request = get(INDEX);
        request.method = Method::POST;
        let response = h.interceptor.handle(&request).await.unwrap();

        assert_eq!(&response.body[..], b"posted");
        assert_eq!(h.network.calls(), vec![format!("POST {}", INDEX)]);
    }

    #[tokio::test]
    async fn test_stale_bucket_is_not_consulted() {
        let h = harness(MockNetwork::new());
        h.network.set_online(false);
        let stale = h.storage.open("v0").await.unwrap();
        stale
            .put(
                &RequestKey::get("http://localhost:8080/app.css"),
                &CachedResponse::new(200, vec![], "old css"),
            )
            .await
            .unwrap();

        let response = h
            .interceptor
            .handle(&get("http://localhost:8080/app.css"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_entry_point() {
        let h = harness(MockNetwork::new());
        let markup = b"<!doctype html><title>Offline video</title>".to_vec();
        seed(&h.storage, INDEX, "text/html", markup.clone()).await;
        h.network.set_online(false);

        let response = h
            .interceptor
            .handle(&navigation("http://localhost:8080/some/deep/link"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], &markup[..]);
    }

    #[tokio::test]
    async fn test_offline_video_gets_cached_video() {
        let h = harness(MockNetwork::new());
        seed(&h.storage, VIDEO, "video/mp4", video_body()).await;
        h.network.set_online(false);

        let request = get("http://localhost:8080/video.mp4?autoplay=1").with_header(
            HeaderName::from_static("sec-fetch-dest"),
            HeaderValue::from_static("video"),
        );
        let response = h.interceptor.handle(&request).await.unwrap();
        assert_eq!(response.body.len(), 10_000);
    }

    #[tokio::test]
    async fn test_offline_other_gets_503() {
        let h = harness(MockNetwork::new());
        h.network.set_online(false);

        let response = h
            .interceptor
            .handle(&get("http://localhost:8080/api/data.json"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

        // Navigation with nothing cached also degrades to 503
        let response = h.interceptor.handle(&navigation(INDEX)).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_range_served_from_cache() {
        let h = harness(MockNetwork::new());
        let body = video_body();
        seed(&h.storage, VIDEO, "video/mp4", body.clone()).await;

        let response = h
            .interceptor
            .handle(&ranged(VIDEO, "bytes=1000-1999"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.header("content-range"), Some("bytes 1000-1999/10000"));
        assert_eq!(&response.body[..], &body[1000..2000]);
        assert!(h.network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_range_not_cached_goes_to_network() {
        let h = harness(MockNetwork::new().route(VIDEO, "video/mp4", "streamed"));

        let response = h
            .interceptor
            .handle(&ranged(VIDEO, "bytes=0-"))
            .await
            .unwrap();

        assert_eq!(&response.body[..], b"streamed");
        assert_eq!(h.network.calls(), vec![format!("GET {}", VIDEO)]);
        // Range responses from the network are not stored
        let bucket = h.storage.open("v1").await.unwrap();
        assert!(!bucket.contains(&RequestKey::get(VIDEO)).await.unwrap());
    }

    #[tokio::test]
    async fn test_range_not_cached_and_offline_propagates() {
        let h = harness(MockNetwork::new());
        h.network.set_online(false);

        let result = h.interceptor.handle(&ranged(VIDEO, "bytes=0-99")).await;
        assert!(result.is_err());
    }

    /// Stores the full video into the bucket mid-fetch, then fails, as when a
    /// concurrent `cacheVideo` finishes while the range request is in flight
    struct CompletesThenFails {
        storage: CacheStorage,
        video: Vec<u8>,
    }

    #[async_trait::async_trait]
    impl Network for CompletesThenFails {
        async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResponse> {
            seed(&self.storage, VIDEO, "video/mp4", self.video.clone()).await;
            Err(WorkerError::Network("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_range_fetch_failure_falls_back_to_full_cached_video() {
        let dir = tempdir().unwrap();
        let storage = CacheStorage::new(dir.path().to_path_buf());
        let config = Arc::new(
            WorkerConfig::new(
                Url::parse(ORIGIN).unwrap(),
                "v1",
                crate::config::DEFAULT_PRECACHE,
                "./video.mp4",
                "./index.html",
            )
            .unwrap(),
        );
        let body = video_body();
        let network = Arc::new(CompletesThenFails {
            storage: storage.clone(),
            video: body.clone(),
        });
        let interceptor = RequestInterceptor::new(config, storage, network);

        let response = interceptor
            .handle(&ranged(VIDEO, "bytes=100-199"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("accept-ranges"), Some("bytes"));
        assert_eq!(&response.body[..], &body[..]);
    }

    #[tokio::test]
    async fn test_range_for_other_path_is_cache_first() {
        let h = harness(MockNetwork::new());
        seed(
            &h.storage,
            "http://localhost:8080/poster.jpg",
            "image/jpeg",
            b"jpeg".to_vec(),
        )
        .await;

        let response = h
            .interceptor
            .handle(&ranged("http://localhost:8080/poster.jpg", "bytes=0-1"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"jpeg");
    }

    #[tokio::test]
    async fn test_malformed_range_returns_full_video() {
        let h = harness(MockNetwork::new());
        seed(&h.storage, VIDEO, "video/mp4", video_body()).await;

        let response = h
            .interceptor
            .handle(&ranged(VIDEO, "bytes=oops"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.len(), 10_000);
        assert_eq!(response.header("accept-ranges"), Some("bytes"));
    }
}
