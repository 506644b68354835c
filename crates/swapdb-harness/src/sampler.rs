//! Continuous verification sampler
//!
//! Re-reads every configured database in turn, pass after pass, so a swap
//! shows up as a burst of mismatches for the databases involved.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::background::BackgroundHandle;
use crate::batch::{Batch, BatchError, BatchExecutor};
use crate::store::KvStore;

/// How often pass statistics are logged
const REPORT_EVERY_PASSES: u64 = 10;

/// Sampler errors
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// A verification batch had failing tasks
    #[error("verification of db {db} failed: {source}")]
    Batch {
        db: u32,
        #[source]
        source: BatchError,
    },
}

/// One database to verify, with the handle to read it through
#[derive(Clone)]
pub struct SampleTarget {
    /// Database the expected values are derived from
    pub db: u32,
    pub store: Arc<dyn KvStore>,
}

impl SampleTarget {
    /// Target expecting the values of the database `store` is bound to
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            db: store.db(),
            store,
        }
    }
}

/// Counters accumulated over a sampler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Completed passes over all targets
    pub passes: u64,
    /// Mismatching reads seen across all passes
    pub mismatches: u64,
}

/// Runs `Get` batches over a fixed list of databases until stopped.
///
/// Databases are verified one at a time; each batch is fully joined before
/// the next one starts. The first failing batch ends the run.
pub struct VerificationSampler {
    executor: BatchExecutor,
    targets: Vec<SampleTarget>,
    count: usize,
    pass_interval: Duration,
}

impl VerificationSampler {
    /// Create a sampler reading `count` keys per target
    pub fn new(executor: BatchExecutor, targets: Vec<SampleTarget>, count: usize) -> Self {
        Self {
            executor,
            targets,
            count,
            pass_interval: Duration::ZERO,
        }
    }

    /// Pause between passes; zero only yields to the scheduler
    pub fn with_pass_interval(mut self, interval: Duration) -> Self {
        self.pass_interval = interval;
        self
    }

    /// Run until `shutdown` flips or a batch fails
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SamplerStats, SamplerError> {
        info!(
            databases = ?self.targets.iter().map(|t| t.db).collect::<Vec<_>>(),
            count = self.count,
            "Verification sampler started"
        );

        let mut stats = SamplerStats::default();

        // Nothing to read: park instead of spinning through empty passes
        if self.targets.is_empty() {
            warn!("Verification sampler has no databases; idle until stopped");
            let _ = shutdown.wait_for(|stop| *stop).await;
            return Ok(stats);
        }

        loop {
            for target in &self.targets {
                if *shutdown.borrow() {
                    break;
                }

                let batch = Batch::get(target.db, self.count);
                let summary = tokio::select! {
                    result = self.executor.execute(Arc::clone(&target.store), batch) => {
                        result.map_err(|source| {
                            error!(db = target.db, "Verification batch failed: {}", source);
                            SamplerError::Batch { db: target.db, source }
                        })?
                    }
                    _ = shutdown.changed() => {
                        info!(passes = stats.passes, "Verification sampler stopped mid-pass");
                        return Ok(stats);
                    }
                };

                stats.mismatches += summary.mismatches as u64;
            }

            if *shutdown.borrow() {
                info!(passes = stats.passes, "Verification sampler stopped");
                return Ok(stats);
            }

            stats.passes += 1;
            if stats.passes % REPORT_EVERY_PASSES == 0 {
                debug!(
                    passes = stats.passes,
                    mismatches = stats.mismatches,
                    "Verification progress"
                );
            }

            if self.pass_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(self.pass_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }

    /// Run on a background task
    pub fn spawn(self) -> BackgroundHandle<Result<SamplerStats, SamplerError>> {
        BackgroundHandle::spawn("verification-sampler", move |shutdown| async move {
            self.run(shutdown).await
        })
    }
}
