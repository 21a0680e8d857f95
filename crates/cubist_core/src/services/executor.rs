//! Bounded worker pool for blocking engine I/O.
//!
//! Every engine call (connect, metadata query, data query) runs on
//! `spawn_blocking` while holding one semaphore permit, so at most
//! `workers` engine calls are in flight. Further calls queue on the
//! semaphore without blocking async worker threads.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::CubistError;

/// Fixed-size dispatcher for blocking engine calls.
#[derive(Clone)]
pub struct EngineExecutor {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl EngineExecutor {
    /// Create an executor with `workers` slots (at least one).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self { permits: Arc::new(Semaphore::new(workers)), workers }
    }

    /// Number of slots.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Slots not currently running an engine call.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run a blocking engine call on a worker slot.
    pub async fn run<F, T>(&self, call: F) -> Result<T, CubistError>
    where
        F: FnOnce() -> Result<T, CubistError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CubistError::internal("Engine executor is closed"))?;

        // The slot stays taken until the call returns, even if the caller
        // stops waiting.
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            call()
        })
        .await?
    }

    /// Run a blocking call against a shared collaborator.
    pub async fn with<S, F, T>(&self, target: Arc<S>, call: F) -> Result<T, CubistError>
    where
        S: ?Sized + Send + Sync + 'static,
        F: FnOnce(&S) -> Result<T, CubistError> + Send + 'static,
        T: Send + 'static,
    {
        self.run(move || call(&target)).await
    }
}

impl std::fmt::Debug for EngineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineExecutor")
            .field("workers", &self.workers)
            .field("available", &self.available())
            .finish()
    }
}
