//! Counting admission control for batch network work.

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Fixed number of downloads/uploads allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Bounds how many tasks of one batch run at the same time.
///
/// Every task must hold a permit for its whole lifetime, so at most
/// `capacity` tasks make progress simultaneously no matter how many are
/// scheduled. Results come back in completion order.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

/// What happened to a task handed to [`ConcurrencyGate::run_all`].
#[derive(Debug)]
pub enum Admission<T> {
    Completed(T),
    /// Shutdown was requested before the task was admitted.
    Cancelled,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run every task under the gate and collect the outcomes.
    ///
    /// A task that has not been admitted when `shutdown` fires is reported
    /// as `Cancelled` without running; admitted tasks always finish. A
    /// failing task has no effect on its siblings.
    pub async fn run_all<I, F, T>(&self, tasks: I, shutdown: &CancellationToken) -> Vec<Admission<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T>,
    {
        let mut pending: FuturesUnordered<_> = tasks
            .into_iter()
            .map(|task| {
                let semaphore = Arc::clone(&self.semaphore);
                async move {
                    let permit = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return Admission::Cancelled,
                        permit = semaphore.acquire_owned() => permit,
                    };
                    // The semaphore is never closed, so acquisition cannot fail.
                    let Ok(_permit) = permit else {
                        return Admission::Cancelled;
                    };
                    if shutdown.is_cancelled() {
                        return Admission::Cancelled;
                    }
                    Admission::Completed(task.await)
                }
            })
            .collect();

        let mut results = Vec::new();
        while let Some(result) = pending.next().await {
            results.push(result);
        }
        results
    }
}
