//! Wire types for the worker's own endpoints

use crate::lifecycle::LifecycleState;
use cache_storage::CacheStats;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub lifecycle: LifecycleState,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
