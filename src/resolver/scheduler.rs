//! Background task scheduling owned by a resolver.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Spawns and owns a resolver's background tasks. Dropping the scheduler
/// aborts them.
#[derive(Debug, Default)]
pub(crate) struct TaskScheduler {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `delay`.
    pub(crate) fn schedule_once<Fut>(&self, delay: Duration, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        self.track(handle);
    }

    /// Run `task` after `delay` and then every `period` until it returns
    /// `ControlFlow::Break`. A run that overruns delays the next one.
    pub(crate) fn schedule_repeating<F, Fut>(&self, delay: Duration, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if task().await.is_break() {
                    break;
                }
            }
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Abort every task.
    pub(crate) fn cancel_all(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.tasks.lock().iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn repeating_task_runs_until_break() {
        let scheduler = TaskScheduler::new();
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        scheduler.schedule_repeating(Duration::from_secs(5), Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_pending_tasks() {
        let scheduler = TaskScheduler::new();
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        scheduler.schedule_once(Duration::from_secs(5), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
