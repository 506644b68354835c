//! # SWAPDB Harness
//!
//! Load generation and verification for exercising a key-value store's
//! database swap while it is under concurrent read load.
//!
//! ## Features
//!
//! - **Deterministic data**: index `i` of database `db` is always `key:<i>` → `value-<db>:<i>`
//! - **Bounded batches**: thousands of independent reads/writes with a fixed concurrency ceiling
//! - **Aggregated failures**: every task runs; all failures come back together, ordered by index
//! - **Real deadlines**: permit waits and store calls are bounded in time
//! - **Continuous verification**: a stoppable sampler re-reads every database, logging mismatches on demand
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐   ┌───────────────────────┐   ┌──────────────┐
//! │ startup / control    │   │ VerificationSampler   │   │  KeyProbe    │
//! │ (populate, get, swap)│   │ (get batches, forever)│   │ (1 key / s)  │
//! └──────────┬───────────┘   └───────────┬───────────┘   └──────┬───────┘
//!            │                           │                      │
//!            ▼                           ▼                      │
//! ┌───────────────────────────────────────────────────┐         │
//! │                   BatchExecutor                    │         │
//! │  (per-call semaphore, JoinSet fan-out, deadlines)  │         │
//! └─────────────────────────┬─────────────────────────┘         │
//!                           ▼                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                KvStore (RedisStore | InMemoryStore)                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use swapdb_harness::prelude::*;
//!
//! let flag = VerificationFlag::new();
//! let executor = BatchExecutor::new(BatchConfig::default(), flag.reader());
//!
//! let store: Arc<dyn KvStore> = Arc::new(RedisStore::connect("localhost:6379", 1).await?);
//! executor.execute(store.clone(), Batch::set(1, 1000)).await?;
//!
//! let sampler = VerificationSampler::new(executor, vec![SampleTarget::new(store)], 1000).spawn();
//! // ...
//! sampler.shutdown().await??;
//! ```

pub mod background;
pub mod batch;
pub mod config;
pub mod probe;
pub mod sampler;
pub mod store;
pub mod verify;

/// Prelude for common imports
pub mod prelude {
    pub use crate::background::BackgroundHandle;
    pub use crate::batch::{
        Batch, BatchConfig, BatchError, BatchExecutor, BatchSummary, MismatchPolicy, Operation,
    };
    pub use crate::config::{Backend, HarnessConfig};
    pub use crate::probe::KeyProbe;
    pub use crate::sampler::{SampleTarget, SamplerStats, VerificationSampler};
    pub use crate::store::{InMemoryKeyspace, InMemoryStore, KvStore, RedisStore, StoreError};
    pub use crate::verify::{VerificationFlag, VerificationFlagReader};
    pub use std::sync::Arc;
}

// Re-export key types at crate root
pub use background::BackgroundHandle;
pub use batch::{
    Batch, BatchConfig, BatchError, BatchExecutor, BatchSummary, MismatchPolicy, Operation,
    TaskError, TaskFailure,
};
pub use config::{Backend, ConfigError, HarnessConfig};
pub use probe::{KeyProbe, ProbeError};
pub use sampler::{SampleTarget, SamplerError, SamplerStats, VerificationSampler};
pub use store::{with_timeout, InMemoryKeyspace, InMemoryStore, KvStore, RedisStore, StoreError};
pub use verify::{VerificationFlag, VerificationFlagReader};
