//! Redis implementation of KvStore

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

use super::traits::{KvStore, StoreError};

/// [`KvStore`] backed by a multiplexed redis connection selected onto one database.
///
/// The connection pipelines commands from concurrent callers over a single
/// socket; each call works on a cheap clone of it.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    db: u32,
}

impl RedisStore {
    /// Connect to `addr` (`host:port`) and select database `db`
    pub async fn connect(addr: &str, db: u32) -> Result<Self, StoreError> {
        let url = format!("redis://{}/{}", addr, db);
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        info!(%addr, db, "Connected to redis");

        Ok(Self { conn, db })
    }
}

/// PSETEX expiry for `ttl`; PSETEX rejects zero, so sub-millisecond TTLs round up
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    fn db(&self) -> u32 {
        self.db
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn.pset_ex(key, value, expiry_millis(ttl)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn swap_databases(&self, a: u32, b: u32) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SWAPDB")
            .arg(a)
            .arg(b)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
