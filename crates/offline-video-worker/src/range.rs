//! Byte-range slicing of the fully cached video
//!
//! The video is only ever cached whole. Range requests are answered by
//! slicing that single stored body:
//!
//! - no `Range` header: the whole body, `200`
//! - a header that does not match `bytes=<start>-<end>?`: the whole body, `200`
//! - `end` past the last byte: clamped to `size - 1`
//! - `start` past the last byte, or `start > end`: `416` with `bytes */size`

use crate::fetch::{FetchResponse, ResponseKind};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use cache_storage::CachedResponse;
use regex::Regex;
use std::sync::LazyLock;

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

static RANGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bytes=(\d+)-(\d+)?").expect("valid range pattern"));

/// A requested byte range; `end` is inclusive and optional
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Parse a `Range` header value. `None` means "ignore the range".
    pub fn parse(value: &str) -> Option<Self> {
        let captures = RANGE_PATTERN.captures(value)?;
        let start = captures.get(1)?.as_str().parse().ok()?;
        let end = match captures.get(2) {
            Some(end) => Some(end.as_str().parse().ok()?),
            None => None,
        };
        Some(Self { start, end })
    }

    /// Inclusive `(start, end)` within a body of `size` bytes, or `None`
    /// when no byte of the body falls inside the range.
    pub fn resolve(&self, size: u64) -> Option<(u64, u64)> {
        if size == 0 || self.start >= size {
            return None;
        }
        let end = self.end.unwrap_or(size - 1).min(size - 1);
        if self.start > end {
            return None;
        }
        Some((self.start, end))
    }
}

/// Outcome of slicing one request against the cached video
#[derive(Debug)]
pub enum Slice {
    NotCached,
    Full(FetchResponse),
    Partial(FetchResponse),
    Unsatisfiable(FetchResponse),
}

impl Slice {
    pub fn into_response(self) -> Option<FetchResponse> {
        match self {
            Slice::NotCached => None,
            Slice::Full(response) | Slice::Partial(response) | Slice::Unsatisfiable(response) => {
                Some(response)
            }
        }
    }
}

fn video_headers(content_length: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(VIDEO_CONTENT_TYPE),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers
}

fn content_range(value: String) -> HeaderValue {
    // Built only from digits, '-', '/', '*' and ASCII text
    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static("bytes */0"))
}

/// The whole cached body as a `200`, advertising range support
pub fn full(cached: &CachedResponse) -> FetchResponse {
    FetchResponse::new(
        StatusCode::OK,
        video_headers(cached.len()),
        cached.body.clone(),
        ResponseKind::Basic,
    )
}

/// Slice `cached` according to the `Range` header value
pub fn slice(cached: Option<&CachedResponse>, range: Option<&str>) -> Slice {
    let Some(cached) = cached else {
        return Slice::NotCached;
    };
    let Some(range) = range.and_then(ByteRange::parse) else {
        return Slice::Full(full(cached));
    };

    let size = cached.len();
    let Some((start, end)) = range.resolve(size) else {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(
            header::CONTENT_RANGE,
            content_range(format!("bytes */{}", size)),
        );
        return Slice::Unsatisfiable(FetchResponse::new(
            StatusCode::RANGE_NOT_SATISFIABLE,
            headers,
            bytes::Bytes::new(),
            ResponseKind::Basic,
        ));
    };

    let chunk_size = end - start + 1;
    let mut headers = video_headers(chunk_size);
    headers.insert(
        header::CONTENT_RANGE,
        content_range(format!("bytes {}-{}/{}", start, end, size)),
    );
    let body = cached.body.slice(start as usize..=end as usize);

    Slice::Partial(FetchResponse::new(
        StatusCode::PARTIAL_CONTENT,
        headers,
        body,
        ResponseKind::Basic,
    ))
}
