//! Offline video worker
//!
//! Sits between pages and a static site origin. On start it precaches a
//! fixed asset list into a version-named bucket and purges buckets from
//! older versions. Afterwards every request is answered cache-first with
//! network fallback, and Range requests for the single video asset are
//! sliced out of its fully cached body.

pub mod config;
pub mod error;
pub mod fetch;
pub mod interceptor;
pub mod lifecycle;
pub mod messages;
pub mod network;
pub mod range;
pub mod server;
pub mod types;
pub mod worker;

pub use error::{Result, WorkerError};
pub use worker::OfflineWorker;
