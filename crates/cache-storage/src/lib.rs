//! Named response buckets stored on disk
//!
//! A [`CacheStorage`] is a directory of buckets. Each [`Bucket`] maps a
//! request identity (method + URL) to a stored response. Buckets are
//! versioned by name and dropped wholesale when superseded; there is no
//! per-entry expiry or size-based eviction.

mod bucket;
mod entry;
mod error;
mod storage;
mod types;

pub use bucket::Bucket;
pub use error::{CacheError, Result};
pub use storage::CacheStorage;
pub use types::{CacheStats, CachedResponse, RequestKey};
