//! Fixed-size worker pool.
//!
//! Event posting and other deferred work run on a small set of workers fed
//! from a submission queue. Submission never blocks and no ordering is
//! guaranteed between work items. `drain` is the shutdown barrier: it
//! resolves once every submitted item has finished.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

/// Default worker count.
pub const POOL_WORKERS: usize = 8;

type Job = BoxFuture<'static, ()>;

/// A fixed set of workers consuming a submitted-work queue.
pub struct WorkerPool {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Job>>>,
    pending: Arc<AtomicUsize>,
    submitted: AtomicU64,
    drained: Arc<Notify>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start a pool with `count` workers.
    pub fn new(count: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));
        let drained = Arc::new(Notify::new());

        let mut workers = Vec::with_capacity(count);
        for _ in 0..count {
            let rx = rx.clone();
            let pending = pending.clone();
            let drained = drained.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => {
                            job.await;
                            if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                                drained.notify_waiters();
                            }
                        }
                        None => break,
                    }
                }
            }));
        }

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            pending,
            submitted: AtomicU64::new(0),
            drained,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a work item. Returns `false` once the pool has been closed.
    pub fn submit(&self, job: impl std::future::Future<Output = ()> + Send + 'static) -> bool {
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(Box::pin(job)).is_ok() {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            false
        }
    }

    /// Wait until every submitted item has completed.
    pub async fn drain(&self) {
        loop {
            let notified = self.drained.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting work and join the workers. Queued items still run.
    pub async fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Total number of items accepted since the pool started.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Items queued or running right now.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(POOL_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drain_waits_for_inflight_work() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.submitted(), 10);
    }

    #[tokio::test]
    async fn drain_returns_immediately_when_idle() {
        let pool = WorkerPool::new(1);
        pool.drain().await;
    }

    #[tokio::test]
    async fn closed_pool_rejects_work() {
        let pool = WorkerPool::new(1);
        pool.close().await;
        assert!(!pool.submit(async {}));
        assert_eq!(pool.submitted(), 0);
    }
}
