use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{JobError, Result};

/// Bounded queue of detached background tasks.
///
/// At most `max_concurrent` tasks run at once and at most `capacity` are
/// queued or running; beyond that `submit` fails with [`JobError::QueueFull`].
/// Every task is tracked so [`TaskQueue::shutdown`] can cancel and wait for
/// all of them.
pub struct TaskQueue {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    capacity: usize,
    cancel: CancellationToken,
}

/// Decrements the pending count when a task ends, however it ends.
struct PendingSlot(Arc<AtomicUsize>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskQueue {
    pub fn new(max_concurrent: usize, capacity: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            pending: Arc::new(AtomicUsize::new(0)),
            capacity,
            cancel: CancellationToken::new(),
        }
    }

    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(JobError::QueueFull);
        }
        if self.pending.fetch_add(1, Ordering::SeqCst) >= self.capacity {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(JobError::QueueFull);
        }

        let slot = PendingSlot(self.pending.clone());
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            let _slot = slot;
            let _permit = tokio::select! {
                _ = cancel.cancelled() => return,
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = task => {}
            }
        });
        Ok(())
    }

    /// Tasks queued or running.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting work and wait for what is already queued to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Stop accepting work, cancel everything in flight and wait for it.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.cancel.cancel();
        self.tracker.wait().await;
        tracing::info!("task queue drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn rejects_beyond_capacity() {
        let queue = TaskQueue::new(1, 2);
        let release = Arc::new(Notify::new());

        for _ in 0..2 {
            let release = release.clone();
            queue
                .submit(async move { release.notified().await })
                .unwrap();
        }
        assert_eq!(queue.len(), 2);
        assert!(matches!(queue.submit(async {}), Err(JobError::QueueFull)));

        queue.shutdown().await;
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn limits_concurrency() {
        let queue = TaskQueue::new(2, 64);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let running = running.clone();
            let peak = peak.clone();
            queue
                .submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        queue.drain().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_work() {
        let queue = TaskQueue::new(4, 16);
        for _ in 0..3 {
            queue.submit(std::future::pending::<()>()).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), queue.shutdown())
            .await
            .unwrap();
        assert!(queue.is_empty());
        assert!(matches!(queue.submit(async {}), Err(JobError::QueueFull)));
    }
}
