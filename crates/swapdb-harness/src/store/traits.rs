//! KvStore trait and store errors

use std::time::Duration;

use async_trait::async_trait;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Error reported by the redis client (connection, protocol, server reply)
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Operation did not finish before its deadline
    #[error("{op} timed out after {limit:?}")]
    Timeout { op: &'static str, limit: Duration },

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// A handle to one logical database of a key-value store.
///
/// Handles must be safe to share between concurrently running tasks; the
/// batch executor clones an `Arc<dyn KvStore>` into every task it spawns.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Logical database index this handle is bound to
    fn db(&self) -> u32;

    /// Read a key. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically exchange the contents of two logical databases
    async fn swap_databases(&self, a: u32, b: u32) -> Result<(), StoreError>;
}
