//! Bounded-concurrency batch executor
//!
//! Fans a batch out as one task per index, caps how many of them talk to the
//! store at once, and joins them all before returning.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

use super::task::{task_key, Batch, Operation, Task};
use crate::store::{with_timeout, KvStore, StoreError};
use crate::verify::VerificationFlagReader;

/// What a `Get` task does when the stored value differs from the expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Count it and log it when verification logging is on
    #[default]
    Report,
    /// Additionally fail the task
    Fail,
}

/// Batch executor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum tasks talking to the store at the same time
    pub max_concurrency: usize,

    /// How long a task may wait for a concurrency permit
    pub acquire_timeout: Duration,

    /// Deadline for each individual store call
    pub op_timeout: Duration,

    /// Handling of value mismatches on reads
    pub mismatch_policy: MismatchPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            acquire_timeout: Duration::from_secs(30),
            op_timeout: Duration::from_secs(5),
            mismatch_policy: MismatchPolicy::Report,
        }
    }
}

impl BatchConfig {
    /// Create a new batch configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum concurrency
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set permit acquisition timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set per-operation timeout
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Set mismatch policy
    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }
}

/// Why a single task failed
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Store call failed or timed out
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Read found no value at all
    #[error("key not found")]
    MissingKey,

    /// Read found a different value (only under [`MismatchPolicy::Fail`])
    #[error("expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    /// No permit became available in time
    #[error("no concurrency permit within {0:?}")]
    PermitTimeout(Duration),

    /// Task panicked before reporting an outcome
    #[error("task panicked")]
    Panicked,
}

/// A failed task, attributed to its index
#[derive(Debug)]
pub struct TaskFailure {
    pub index: usize,
    pub key: String,
    pub error: TaskError,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.error)
    }
}

/// Every failure of one batch, ordered by task index.
///
/// Only produced when at least one task failed.
#[derive(Debug)]
pub struct BatchError {
    pub operation: Operation,
    pub db: u32,
    pub attempted: usize,
    pub failures: Vec<TaskFailure>,
}

impl BatchError {
    /// Indices of the failed tasks
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 3;

        write!(
            f,
            "{} batch for db {}: {} of {} tasks failed",
            self.operation,
            self.db,
            self.failures.len(),
            self.attempted
        )?;
        for failure in self.failures.iter().take(SHOWN) {
            write!(f, "; {}", failure)?;
        }
        if self.failures.len() > SHOWN {
            write!(f, "; ...")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

/// Outcome of a batch in which no task failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub operation: Operation,
    pub db: u32,
    pub attempted: usize,
    /// Reads that returned a value other than the expected one
    pub mismatches: usize,
    pub elapsed: Duration,
}

/// State shared by all tasks of one batch
struct BatchRun {
    store: Arc<dyn KvStore>,
    batch: Batch,
    config: BatchConfig,
    mismatches: AtomicUsize,
    verification: VerificationFlagReader,
}

impl BatchRun {
    /// Holds `_permit` until the store call settles, panics included
    async fn run(&self, task: Task, _permit: OwnedSemaphorePermit) -> Result<(), TaskError> {
        let key = task.key();
        let expected = task.value(self.batch.db);
        let limit = self.config.op_timeout;

        match self.batch.operation {
            Operation::Set => {
                with_timeout("set", limit, self.store.set(&key, &expected, None)).await?;
            }
            Operation::Get => {
                let actual = with_timeout("get", limit, self.store.get(&key))
                    .await?
                    .ok_or(TaskError::MissingKey)?;

                if actual != expected {
                    self.mismatches.fetch_add(1, Ordering::Relaxed);
                    if self.verification.is_enabled() {
                        warn!(%key, %expected, %actual, "Value mismatch");
                    }
                    if self.config.mismatch_policy == MismatchPolicy::Fail {
                        return Err(TaskError::Mismatch { expected, actual });
                    }
                }
            }
        }

        Ok(())
    }
}

/// Executes batches against a store with bounded concurrency.
///
/// Each [`execute`](Self::execute) call owns its own semaphore, so one
/// executor can serve any number of concurrent callers without them sharing
/// a concurrency budget.
///
/// # Example
///
/// ```ignore
/// use swapdb_harness::batch::{Batch, BatchConfig, BatchExecutor};
///
/// let executor = BatchExecutor::new(BatchConfig::new().with_max_concurrency(10), flag.reader());
///
/// executor.execute(store.clone(), Batch::set(0, 1000)).await?;
/// let summary = executor.execute(store, Batch::get(0, 1000)).await?;
/// assert_eq!(summary.mismatches, 0);
/// ```
#[derive(Clone)]
pub struct BatchExecutor {
    config: BatchConfig,
    verification: VerificationFlagReader,
}

impl BatchExecutor {
    /// Create a new executor
    pub fn new(config: BatchConfig, verification: VerificationFlagReader) -> Self {
        Self {
            config: config.with_max_concurrency(config.max_concurrency),
            verification,
        }
    }

    /// Run every task of `batch` against `store` and wait for all of them.
    ///
    /// No task is skipped because another failed. Permits are handed out in
    /// index order before each task is spawned, so the permit deadline only
    /// trips when no store call has finished for that long. Dropping the
    /// returned future aborts the tasks still outstanding.
    #[instrument(skip_all, fields(operation = %batch.operation, db = batch.db, count = batch.count))]
    pub async fn execute(
        &self,
        store: Arc<dyn KvStore>,
        batch: Batch,
    ) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();

        if batch.count == 0 {
            return Ok(BatchSummary {
                operation: batch.operation,
                db: batch.db,
                attempted: 0,
                mismatches: 0,
                elapsed: started.elapsed(),
            });
        }

        let run = Arc::new(BatchRun {
            store,
            batch,
            config: self.config,
            mismatches: AtomicUsize::new(0),
            verification: self.verification.clone(),
        });
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency));
        let acquire_timeout = self.config.acquire_timeout;

        let mut settled = vec![false; batch.count];
        let mut failures = Vec::new();
        let mut tasks = JoinSet::new();

        for task in batch.tasks() {
            // The semaphore is local and never closed; only the deadline can fail
            let permit =
                match tokio::time::timeout(acquire_timeout, Arc::clone(&permits).acquire_owned())
                    .await
                {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) | Err(_) => {
                        warn!(index = task.index, ?acquire_timeout, "No concurrency permit");
                        settled[task.index] = true;
                        failures.push(TaskFailure {
                            index: task.index,
                            key: task.key(),
                            error: TaskError::PermitTimeout(acquire_timeout),
                        });
                        continue;
                    }
                };

            let run = Arc::clone(&run);
            tasks.spawn(async move { (task.index, run.run(task, permit).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    settled[index] = true;
                    if let Err(error) = outcome {
                        failures.push(TaskFailure {
                            index,
                            key: task_key(index),
                            error,
                        });
                    }
                }
                Err(e) => {
                    error!("Batch task did not complete: {}", e);
                }
            }
        }

        // Tasks that never reported back panicked
        for (index, _) in settled.iter().enumerate().filter(|(_, done)| !**done) {
            failures.push(TaskFailure {
                index,
                key: task_key(index),
                error: TaskError::Panicked,
            });
        }

        let elapsed = started.elapsed();
        let mismatches = run.mismatches.load(Ordering::Relaxed);

        if failures.is_empty() {
            debug!(mismatches, ?elapsed, "Batch completed");
            return Ok(BatchSummary {
                operation: batch.operation,
                db: batch.db,
                attempted: batch.count,
                mismatches,
                elapsed,
            });
        }

        failures.sort_by_key(|f| f.index);
        warn!(
            failed = failures.len(),
            mismatches,
            ?elapsed,
            "Batch completed with failures"
        );

        Err(BatchError {
            operation: batch.operation,
            db: batch.db,
            attempted: batch.count,
            failures,
        })
    }
}
