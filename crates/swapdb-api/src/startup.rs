// Startup sequence: connect one store handle per database, then populate them
//
// Decision: Population failures are fatal; there is nothing to verify without data

use std::sync::Arc;

use swapdb_harness::{
    with_timeout, Backend, Batch, BatchError, BatchExecutor, HarnessConfig, InMemoryKeyspace,
    KvStore, RedisStore, StoreError,
};

/// Open a handle for every configured database, in configuration order
pub async fn connect(config: &HarnessConfig) -> Result<Vec<Arc<dyn KvStore>>, StoreError> {
    match config.backend {
        Backend::Redis => {
            let mut stores: Vec<Arc<dyn KvStore>> = Vec::with_capacity(config.databases.len());
            for &db in &config.databases {
                let store = with_timeout(
                    "connect",
                    config.batch.op_timeout,
                    RedisStore::connect(&config.redis_addr, db),
                )
                .await?;
                stores.push(Arc::new(store));
            }
            Ok(stores)
        }
        Backend::Memory => {
            tracing::warn!("Using in-memory keyspace; no external store is exercised");
            let keyspace = InMemoryKeyspace::new();
            Ok(config
                .databases
                .iter()
                .map(|&db| Arc::new(keyspace.store(db)) as Arc<dyn KvStore>)
                .collect())
        }
    }
}

/// Write `count` deterministic keys into every database, one database at a time
pub async fn populate(
    executor: &BatchExecutor,
    stores: &[Arc<dyn KvStore>],
    count: usize,
) -> Result<(), BatchError> {
    for store in stores {
        let summary = executor
            .execute(Arc::clone(store), Batch::set(store.db(), count))
            .await?;
        tracing::info!(
            db = summary.db,
            keys = summary.attempted,
            elapsed = ?summary.elapsed,
            "Database populated"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapdb_harness::{BatchConfig, VerificationFlag};

    fn memory_config(databases: Vec<u32>) -> HarnessConfig {
        HarnessConfig {
            backend: Backend::Memory,
            databases,
            ..HarnessConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connect_memory_backend_in_order() {
        let stores = connect(&memory_config(vec![2, 0, 1])).await.unwrap();

        let dbs: Vec<u32> = stores.iter().map(|s| s.db()).collect();
        assert_eq!(dbs, vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn test_memory_handles_share_one_keyspace() {
        let stores = connect(&memory_config(vec![0, 1])).await.unwrap();

        stores[1].set("key:0", "value-1:0", None).await.unwrap();
        stores[0].swap_databases(0, 1).await.unwrap();

        assert_eq!(
            stores[0].get("key:0").await.unwrap().as_deref(),
            Some("value-1:0")
        );
    }

    #[tokio::test]
    async fn test_populate_writes_each_database() {
        let stores = connect(&memory_config(vec![0, 1, 2])).await.unwrap();
        let executor = BatchExecutor::new(BatchConfig::new(), VerificationFlag::new().reader());

        populate(&executor, &stores, 25).await.unwrap();

        for store in &stores {
            let summary = executor
                .execute(Arc::clone(store), Batch::get(store.db(), 25))
                .await
                .unwrap();
            assert_eq!(summary.mismatches, 0);
            assert_eq!(
                store.get("key:24").await.unwrap(),
                Some(format!("value-{}:24", store.db()))
            );
        }
    }
}
