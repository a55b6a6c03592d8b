//! Request and response values passed between the interceptor, the
//! network and the cache

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use cache_storage::{CachedResponse, RequestKey};
use url::Url;

/// What kind of resource the page expects back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Video,
    Other,
}

impl Destination {
    /// Derive the destination from `Sec-Fetch-Dest`, falling back to `Accept`
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if let Some(dest) = headers
            .get("sec-fetch-dest")
            .and_then(|v| v.to_str().ok())
        {
            return match dest.trim() {
                "document" | "iframe" | "frame" => Destination::Document,
                "video" => Destination::Video,
                _ => Destination::Other,
            };
        }

        let accept = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if accept.contains("text/html") {
            Destination::Document
        } else if accept.starts_with("video/") {
            Destination::Video
        } else {
            Destination::Other
        }
    }
}

/// An outgoing request as seen by the worker
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub destination: Destination,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        let destination = Destination::from_headers(&headers);
        Self {
            method,
            url,
            headers,
            body,
            destination,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, HeaderMap::new(), Bytes::new())
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self.destination = Destination::from_headers(&self.headers);
        self
    }

    /// Identity used for bucket lookups
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.as_str(), self.url.as_str())
    }

    pub fn range(&self) -> Option<&str> {
        self.headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
    }
}

/// How much of a response the worker may inspect and store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Same-origin
    Basic,
    /// Cross-origin, readable
    Cors,
    /// Cross-origin, uninspectable
    Opaque,
}

/// A response on its way back to the page.
///
/// Deliberately not `Clone`: a body is handed out once. Anything that both
/// returns and stores a response calls [`FetchResponse::duplicate`] first.
#[derive(Debug)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl FetchResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, kind: ResponseKind) -> Self {
        Self {
            status,
            headers,
            body,
            kind,
        }
    }

    /// Synthetic response for when neither network nor cache can answer
    pub fn offline() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            headers,
            Bytes::from_static(b"Offline"),
            ResponseKind::Basic,
        )
    }

    pub fn duplicate(&self) -> Self {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            kind: self.kind,
        }
    }

    /// Same-origin, inspectable and complete
    pub fn is_cacheable(&self) -> bool {
        self.kind == ResponseKind::Basic && self.status == StatusCode::OK
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn into_cached(self) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        CachedResponse::new(self.status.as_u16(), headers, self.body)
    }
}

impl From<CachedResponse> for FetchResponse {
    fn from(cached: CachedResponse) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &cached.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
        Self::new(status, headers, cached.body, ResponseKind::Basic)
    }
}

impl IntoResponse for FetchResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
