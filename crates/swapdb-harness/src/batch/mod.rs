//! Bounded batch execution
//!
//! This module provides:
//! - [`Batch`] / [`Task`] - deterministic key/value generation per index
//! - [`BatchExecutor`] - semaphore-limited fan-out with joined, aggregated results
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  BatchExecutor::execute                   │
//! │                                                           │
//! │   Batch { op, db, count }                                 │
//! │         │  one task per index                             │
//! │         ▼                                                 │
//! │   ┌──────────────────────────────────────────────────┐    │
//! │   │        JoinSet (Semaphore-limited permits)       │    │
//! │   │  [key:0] [key:1] [key:2] ... [key:count-1]       │    │
//! │   └──────────────────────────────────────────────────┘    │
//! │         │  join all, sort failures by index               │
//! │         ▼                                                 │
//! │   Ok(BatchSummary) | Err(BatchError { failures })         │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod executor;
mod task;

pub use executor::{
    BatchConfig, BatchError, BatchExecutor, BatchSummary, MismatchPolicy, TaskError, TaskFailure,
};
pub use task::{task_key, task_value, Batch, Operation, Task};
