//! Access to the real network

use crate::error::Result;
use crate::fetch::{FetchRequest, FetchResponse, ResponseKind};
use async_trait::async_trait;
use axum::http::header::{HeaderMap, HeaderName};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Something that can satisfy a request when the cache cannot
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// HTTP client for fetching from the site origin
pub struct HttpNetwork {
    client: Client,
    origin: Url,
}

impl HttpNetwork {
    pub fn new(origin: Url, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            origin,
        })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        debug!(method = %request.method, url = %request.url, "Fetching from network");

        let mut outgoing = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(end_to_end(&request.headers));
        if !request.body.is_empty() {
            outgoing = outgoing.body(request.body.clone());
        }

        let response = outgoing.send().await?;
        let status = response.status();
        let headers = end_to_end(response.headers());

        let kind = if request.url.origin() == self.origin.origin() {
            ResponseKind::Basic
        } else {
            ResponseKind::Opaque
        };

        let body = response.bytes().await?;

        if !status.is_success() {
            warn!(status = %status, url = %request.url, "Network returned non-success status");
        }
        debug!(
            status = %status,
            size = body.len(),
            url = %request.url,
            "Fetched from network"
        );

        Ok(FetchResponse::new(status, headers, body, kind))
    }
}
