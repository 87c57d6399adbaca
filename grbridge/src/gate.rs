use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::DispatchError;

/// Admission control for the engine's worker pool.
///
/// The engine executes blocking calls on a small fixed number of
/// workers; dispatching with none available would overcommit it.  A
/// permit is acquired before every invocation and held until the call
/// finishes, so waiters suspend cooperatively instead of polling.
pub struct EnginePool {
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl EnginePool {
    pub fn new(workers: usize) -> Self {
        let semaphore = Arc::new(Semaphore::new(workers));
        if workers == 0 {
            // no worker will ever become idle; fail acquisition
            // immediately instead of suspending forever
            semaphore.close();
        }
        Self { semaphore, workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Suspends until an engine worker is idle; returns at once if one
    /// already is.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, DispatchError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Unavailable)
    }
}
