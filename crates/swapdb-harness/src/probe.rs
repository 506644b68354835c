//! Periodic single-key probe
//!
//! Logs the current value of one key at a fixed interval, which makes a swap
//! visible in the log without turning on verification logging.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::background::BackgroundHandle;
use crate::store::{with_timeout, KvStore, StoreError};

/// Probe errors
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Reading the probed key failed
    #[error("probe read of {key} failed: {source}")]
    Read {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Reads one key every `interval` until stopped
pub struct KeyProbe {
    store: Arc<dyn KvStore>,
    key: String,
    interval: Duration,
    op_timeout: Duration,
}

impl KeyProbe {
    /// Create a probe of `key` through `store`
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>, interval: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            interval,
            op_timeout: Duration::from_secs(5),
        }
    }

    /// Set the deadline of each read
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Read once and log the result
    pub async fn probe_once(&self) -> Result<Option<String>, ProbeError> {
        let value = with_timeout("get", self.op_timeout, self.store.get(&self.key))
            .await
            .map_err(|source| ProbeError::Read {
                key: self.key.clone(),
                source,
            })?;

        match &value {
            Some(value) => info!(key = %self.key, %value, db = self.store.db(), "Probe"),
            None => info!(key = %self.key, db = self.store.db(), "Probe: key absent"),
        }

        Ok(value)
    }

    /// Run until `shutdown` flips or a read fails. Returns the number of reads.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<u64, ProbeError> {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reads = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.probe_once().await {
                        error!("{}", e);
                        return Err(e);
                    }
                    reads += 1;
                }
                _ = shutdown.changed() => {
                    return Ok(reads);
                }
            }
        }
    }

    /// Run on a background task
    pub fn spawn(self) -> BackgroundHandle<Result<u64, ProbeError>> {
        BackgroundHandle::spawn("key-probe", move |shutdown| async move {
            self.run(shutdown).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryKeyspace;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        fn db(&self) -> u32 {
            0
        }

        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), StoreError> {
            Ok(())
        }

        async fn swap_databases(&self, _: u32, _: u32) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_probe_once_sees_swap() {
        let keyspace = InMemoryKeyspace::new();
        let db0 = keyspace.store(0);
        let db1 = keyspace.store(1);
        db0.set("key:10", "value-0:10", None).await.unwrap();
        db1.set("key:10", "value-1:10", None).await.unwrap();

        let probe = KeyProbe::new(Arc::new(db0.clone()), "key:10", Duration::from_secs(1));
        assert_eq!(probe.probe_once().await.unwrap().as_deref(), Some("value-0:10"));

        db0.swap_databases(0, 1).await.unwrap();
        assert_eq!(probe.probe_once().await.unwrap().as_deref(), Some("value-1:10"));
    }

    #[tokio::test]
    async fn test_absent_key_is_not_an_error() {
        let keyspace = InMemoryKeyspace::new();
        let probe = KeyProbe::new(Arc::new(keyspace.store(0)), "key:10", Duration::from_secs(1));

        assert_eq!(probe.probe_once().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_stopped() {
        let keyspace = InMemoryKeyspace::new();
        let probe = KeyProbe::new(
            Arc::new(keyspace.store(0)),
            "key:10",
            Duration::from_millis(100),
        );
        let handle = probe.spawn();

        // First tick is immediate, then one per interval
        tokio::time::sleep(Duration::from_millis(350)).await;
        let reads = handle.shutdown().await.unwrap().unwrap();

        assert_eq!(reads, 4);
    }

    #[tokio::test]
    async fn test_read_failure_ends_run() {
        let mut handle = KeyProbe::new(Arc::new(BrokenStore), "key:10", Duration::from_millis(5))
            .spawn();

        let result = handle.wait().await.unwrap();
        match result {
            Err(ProbeError::Read { key, source }) => {
                assert_eq!(key, "key:10");
                assert!(matches!(source, StoreError::Backend(_)));
            }
            other => panic!("expected read failure, got {:?}", other),
        }
    }
}
