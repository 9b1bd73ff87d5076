//! Task queue with blocking pop and an outstanding-work barrier.

use crate::model::Task;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Task>,
    in_flight: HashSet<u64>,
    /// Pushed but not yet marked done (pending + in flight).
    outstanding: usize,
    next_id: u64,
}

/// FIFO of pending [`Task`]s shared by the orchestrator and the workers.
///
/// Completion is tracked per task rather than against a fixed total, so
/// [`drain`](Self::drain) can be called once per wave of pushes.
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Notify,
    idle: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a task and returns the id assigned to it.
    pub fn push(&self, mut task: Task) -> u64 {
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            task.id = state.next_id;
            state.outstanding += 1;
            state.pending.push_back(task);
            state.next_id
        };
        self.available.notify_one();
        id
    }

    /// Waits for the next task.
    ///
    /// Returns `None` only once `stop` is cancelled and nothing is pending;
    /// tasks still queued when stop is requested are handed out first.
    pub async fn pop(&self, stop: &CancellationToken) -> Option<Task> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            if stop.is_cancelled() {
                return None;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = stop.cancelled() => {}
            }
        }
    }

    fn try_pop(&self) -> Option<Task> {
        let mut state = self.state.lock();
        let task = state.pending.pop_front()?;
        state.in_flight.insert(task.id);
        Some(task)
    }

    /// Records completion of a popped task.
    ///
    /// Returns `false` (and changes nothing) if the task is not in flight,
    /// i.e. it was never popped or was already marked done.
    pub fn mark_done(&self, task: &Task) -> bool {
        let now_idle = {
            let mut state = self.state.lock();
            if !state.in_flight.remove(&task.id) {
                drop(state);
                warn!(task_id = task.id, "mark_done on a task that is not in flight");
                return false;
            }
            state.outstanding -= 1;
            state.outstanding == 0
        };
        if now_idle {
            self.idle.notify_waiters();
        }
        true
    }

    /// Blocks until every pushed task has been marked done.
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state.lock().outstanding == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Tasks waiting to be popped.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Tasks pushed and not yet marked done.
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn task(n: usize) -> Task {
        Task::url(format!("https://example.com/{n}.pdf"), Some("pdf".into()))
    }

    #[tokio::test]
    async fn test_fifo_order_and_ids() {
        let queue = TaskQueue::new();
        let stop = CancellationToken::new();
        let first = queue.push(task(1));
        let second = queue.push(task(2));
        assert_ne!(first, second);

        assert_eq!(queue.pop(&stop).await.map(|t| t.id), Some(first));
        assert_eq!(queue.pop(&stop).await.map(|t| t.id), Some(second));
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.outstanding(), 2);
    }

    #[tokio::test]
    async fn test_drain_on_empty_queue_returns() {
        let queue = TaskQueue::new();
        tokio::time::timeout(Duration::from_secs(1), queue.drain())
            .await
            .expect("drain should not block on an empty queue");
    }

    #[tokio::test]
    async fn test_mark_done_twice_is_rejected() {
        let queue = TaskQueue::new();
        let stop = CancellationToken::new();
        queue.push(task(1));
        queue.push(task(2));
        let popped = queue.pop(&stop).await.unwrap();

        assert!(queue.mark_done(&popped));
        assert!(!queue.mark_done(&popped));
        assert_eq!(queue.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_pop_hands_out_pending_before_stopping() {
        let queue = TaskQueue::new();
        let stop = CancellationToken::new();
        queue.push(task(1));
        stop.cancel();

        assert!(queue.pop(&stop).await.is_some());
        assert!(queue.pop(&stop).await.is_none());
    }

    #[tokio::test]
    async fn test_blocked_pop_wakes_on_stop() {
        let queue = Arc::new(TaskQueue::new());
        let stop = CancellationToken::new();
        let handle = {
            let queue = queue.clone();
            let stop = stop.clone();
            tokio::spawn(async move { queue.pop(&stop).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.cancel();
        let popped = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pop should observe the stop signal")
            .unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_task() {
        let queue = Arc::new(TaskQueue::new());
        let stop = CancellationToken::new();
        queue.push(task(1));
        let popped = queue.pop(&stop).await.unwrap();

        let drained = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drain().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drained.is_finished());

        queue.mark_done(&popped);
        tokio::time::timeout(Duration::from_secs(1), drained)
            .await
            .expect("drain should complete once the task is done")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_stress_many_workers_multiple_waves() {
        const WORKERS: usize = 32;
        const PER_WAVE: usize = 500;

        let queue = Arc::new(TaskQueue::new());
        let stop = CancellationToken::new();
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let done = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..WORKERS {
            let queue = queue.clone();
            let stop = stop.clone();
            let seen = seen.clone();
            let done = done.clone();
            handles.push(tokio::spawn(async move {
                while let Some(task) = queue.pop(&stop).await {
                    assert!(seen.lock().insert(task.id), "task popped twice");
                    tokio::task::yield_now().await;
                    done.fetch_add(1, Ordering::SeqCst);
                    assert!(queue.mark_done(&task));
                }
            }));
        }

        for wave in 1..=3 {
            for n in 0..PER_WAVE {
                queue.push(task(n));
            }
            queue.drain().await;
            assert_eq!(done.load(Ordering::SeqCst), wave * PER_WAVE);
            assert_eq!(queue.outstanding(), 0);
        }

        stop.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(seen.lock().len(), 3 * PER_WAVE);
    }
}
