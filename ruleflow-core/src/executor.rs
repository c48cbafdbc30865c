//! Worker-pool abstraction used by the dispatcher for fan-out and async
//! submission.

use crate::error::RuleError;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A unit of work handed to a pool.
pub type TaskFuture = BoxFuture<'static, ()>;

/// A task the pool refused, handed back so the caller can run it another way.
///
/// Futures have a single owner, so a saturated pool cannot simply return an
/// error and let the caller retry the same closure — it returns the task
/// itself along with the reason.
pub struct RejectedTask {
    pub task: TaskFuture,
    pub reason: RuleError,
}

impl std::fmt::Debug for RejectedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RejectedTask").field("reason", &self.reason).finish_non_exhaustive()
    }
}

/// Cooperating task executor. The dispatcher prefers the pool for fan-out
/// branches and falls back to a plain spawn when `submit` rejects, so a full
/// pool never stalls a traversal.
pub trait WorkerPool: Send + Sync {
    fn submit(&self, task: TaskFuture) -> Result<(), RejectedTask>;

    /// Stop accepting tasks. Already-running tasks finish normally.
    fn release(&self);
}

/// Default pool: bounds the number of concurrently running tasks with a
/// semaphore over `tokio::spawn`.
pub struct TokioWorkerPool {
    permits: Arc<Semaphore>,
}

impl TokioWorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(capacity)) }
    }

    /// Number of free slots, mostly useful in tests.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl WorkerPool for TokioWorkerPool {
    fn submit(&self, task: TaskFuture) -> Result<(), RejectedTask> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                tokio::spawn(async move {
                    task.await;
                    drop(permit);
                });
                Ok(())
            }
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                Err(RejectedTask { task, reason: RuleError::PoolFull })
            }
            Err(tokio::sync::TryAcquireError::Closed) => {
                Err(RejectedTask { task, reason: RuleError::Stopped })
            }
        }
    }

    fn release(&self) {
        self.permits.close();
    }
}
