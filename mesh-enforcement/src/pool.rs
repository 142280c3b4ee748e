//! Concurrency-capped task spawning for request handlers.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Spawns handler tasks with a cap on how many run at once.
///
/// Every inbound delivery becomes its own task, so one slow policy call or
/// adapter dispatch never stalls the subject; the cap bounds how much work
/// a burst can hold in flight.
#[derive(Clone)]
pub struct HandlerPool {
    semaphore: Arc<Semaphore>,
}

impl HandlerPool {
    /// Creates a pool allowing `max_in_flight` concurrent handlers.
    #[must_use]
    pub fn new(max_in_flight: NonZeroUsize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight.get())),
        }
    }

    /// Spawns a handler future; it waits for a slot before running.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            // The semaphore is never closed, so acquire can only fail if the
            // pool itself is gone.
            let Ok(permit) = semaphore.acquire_owned().await else {
                return;
            };
            future.await;
            drop(permit);
        })
    }
}

impl Default for HandlerPool {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(64).expect("non-zero"))
    }
}

impl std::fmt::Debug for HandlerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerPool")
            .field("available", &self.semaphore.available_permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn cap_bounds_concurrent_handlers() {
        let pool = HandlerPool::new(NonZeroUsize::new(2).unwrap());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(pool.spawn(async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
