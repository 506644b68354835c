//! In-memory implementation of KvStore for testing

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::traits::{KvStore, StoreError};

/// Stored value with optional expiry
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

type Database = HashMap<String, Entry>;

/// A set of numbered databases shared by every [`InMemoryStore`] created from it.
///
/// Swapping two databases exchanges their maps under a single write lock, so
/// readers observe either the old or the new assignment, never a mix.
///
/// # Example
///
/// ```
/// use swapdb_harness::InMemoryKeyspace;
///
/// let keyspace = InMemoryKeyspace::new();
/// let db0 = keyspace.store(0);
/// let db1 = keyspace.store(1);
/// ```
#[derive(Default)]
pub struct InMemoryKeyspace {
    databases: RwLock<HashMap<u32, Database>>,
}

impl InMemoryKeyspace {
    /// Create an empty keyspace
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get a store handle bound to database `db`
    pub fn store(self: &Arc<Self>, db: u32) -> InMemoryStore {
        InMemoryStore {
            keyspace: Arc::clone(self),
            db,
        }
    }

    /// Number of live keys in a database
    pub fn len(&self, db: u32) -> usize {
        let now = Instant::now();
        self.databases
            .read()
            .get(&db)
            .map_or(0, |d| d.values().filter(|e| e.is_live(now)).count())
    }

    /// Whether a database holds no live keys
    pub fn is_empty(&self, db: u32) -> bool {
        self.len(db) == 0
    }

    fn get(&self, db: u32, key: &str) -> Option<String> {
        let now = Instant::now();
        self.databases
            .read()
            .get(&db)
            .and_then(|d| d.get(key))
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    fn set(&self, db: u32, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.databases
            .write()
            .entry(db)
            .or_default()
            .insert(key.to_string(), entry);
    }

    fn swap(&self, a: u32, b: u32) {
        if a == b {
            return;
        }
        let mut databases = self.databases.write();
        let first = databases.remove(&a).unwrap_or_default();
        let second = databases.remove(&b).unwrap_or_default();
        databases.insert(a, second);
        databases.insert(b, first);
    }
}

/// In-memory [`KvStore`] handle for one database of an [`InMemoryKeyspace`]
#[derive(Clone)]
pub struct InMemoryStore {
    keyspace: Arc<InMemoryKeyspace>,
    db: u32,
}

#[async_trait]
impl KvStore for InMemoryStore {
    fn db(&self) -> u32 {
        self.db
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.keyspace.get(self.db, key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.keyspace.set(self.db, key, value, ttl);
        Ok(())
    }

    async fn swap_databases(&self, a: u32, b: u32) -> Result<(), StoreError> {
        self.keyspace.swap(a, b);
        Ok(())
    }
}
