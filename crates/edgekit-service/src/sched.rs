//! Periodic task runner for autoevents.
//!
//! Tasks are registered by name with a fixed interval; the scheduler spawns
//! one timer task per entry once started. Registration before `start` is
//! deferred, registration while running spawns immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

/// Factory producing one run of a scheduled task.
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Entry {
    interval: Duration,
    run: TaskFn,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    running: bool,
    tasks: HashMap<String, Entry>,
}

/// Periodic-task scheduler.
#[derive(Default)]
pub struct Scheduler {
    inner: std::sync::Mutex<Inner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a periodic task.
    pub fn schedule(&self, id: impl Into<String>, interval: Duration, run: TaskFn) {
        let id = id.into();
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let handle = if inner.running {
            Some(spawn_timer(interval, run.clone()))
        } else {
            None
        };
        if let Some(old) = inner.tasks.insert(
            id,
            Entry {
                interval,
                run,
                handle,
            },
        ) {
            if let Some(handle) = old.handle {
                handle.abort();
            }
        }
    }

    /// Remove a task, stopping its timer if running.
    pub fn remove(&self, id: &str) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if let Some(entry) = inner.tasks.remove(id) {
            if let Some(handle) = entry.handle {
                handle.abort();
            }
        }
    }

    /// Start timers for every registered task.
    pub fn start(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.running {
            return;
        }
        inner.running = true;
        for entry in inner.tasks.values_mut() {
            if entry.handle.is_none() {
                entry.handle = Some(spawn_timer(entry.interval, entry.run.clone()));
            }
        }
    }

    /// Stop every timer. Registrations are kept for a later `start`.
    pub fn stop(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.running = false;
        for entry in inner.tasks.values_mut() {
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().map(|inner| inner.running).unwrap_or(false)
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.tasks.len()).unwrap_or(0)
    }
}

fn spawn_timer(interval: Duration, run: TaskFn) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            run().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(counter: Arc<AtomicUsize>) -> TaskFn {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn tasks_fire_only_after_start() {
        let sched = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        sched.schedule("t", Duration::from_millis(5), counting_task(counter.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        sched.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(counter.load(Ordering::SeqCst) >= 2);

        sched.stop();
        let after_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn remove_stops_a_running_task() {
        let sched = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        sched.start();
        sched.schedule("t", Duration::from_millis(5), counting_task(counter.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        sched.remove("t");
        assert_eq!(sched.task_count(), 0);
        let after_remove = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_remove);
    }
}
