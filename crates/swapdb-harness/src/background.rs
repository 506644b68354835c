//! Stoppable background tasks
//!
//! Long-running loops (sampler, probe) take a `watch::Receiver<bool>` and
//! return once it flips to `true` or its sender goes away.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

/// Handle to a spawned loop with an explicit stop signal
pub struct BackgroundHandle<T> {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> BackgroundHandle<T> {
    /// Spawn `f` on the runtime, handing it the stop signal
    pub fn spawn<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(f(shutdown_rx));
        debug!(task = name, "Background task started");

        Self {
            name,
            shutdown_tx,
            handle,
        }
    }
}

impl<T> BackgroundHandle<T> {
    /// Task name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the loop to stop; does not wait
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether the task has already returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to return on its own.
    ///
    /// Must not be called again once it has resolved.
    pub async fn wait(&mut self) -> Result<T, JoinError> {
        (&mut self.handle).await
    }

    /// Stop the task and wait for it
    pub async fn shutdown(self) -> Result<T, JoinError> {
        self.stop();
        let result = self.handle.await;
        debug!(task = self.name, "Background task stopped");
        result
    }
}
