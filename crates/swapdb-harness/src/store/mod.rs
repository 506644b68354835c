//! Store adapters
//!
//! This module provides:
//! - [`KvStore`] trait, one handle per logical database
//! - [`RedisStore`] for a real redis server
//! - [`InMemoryKeyspace`] / [`InMemoryStore`] for testing

mod memory;
mod redis_store;
mod traits;

use std::future::Future;
use std::time::Duration;

pub use memory::{InMemoryKeyspace, InMemoryStore};
pub use redis_store::RedisStore;
pub use traits::{KvStore, StoreError};

/// Run a store operation under a deadline.
///
/// Elapsed deadlines become [`StoreError::Timeout`] tagged with `op`.
pub async fn with_timeout<T, F>(op: &'static str, limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout { op, limit }),
    }
}
