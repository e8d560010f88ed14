//! The two bounded executors described in the design notes: a parallel runner pool and a
//! single-worker status pool. Both share the same shape -- a "closing" flag plus idle detection
//! via an outstanding-task counter -- rather than polling each other's internals.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::future::Future;

use tokio::sync::{mpsc, Notify, Semaphore};

/// A bounded, parallel executor of async tasks. `capacity` mirrors `available_slots`: the number
/// of jobs the runner pool will run concurrently regardless of slot accounting (the admission
/// controller decides whether any individual job may proceed; this just bounds concurrency).
pub struct RunnerPool {
    semaphore: Arc<Semaphore>,
    closing: Arc<AtomicBool>,
    outstanding: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl RunnerPool {
    pub fn new(capacity: usize) -> Self {
        RunnerPool {
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
            closing: Arc::new(AtomicBool::new(false)),
            outstanding: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Waits for a free slot, then runs `task` on a detached tokio task. A no-op if the pool is
    /// already closing. Returns once the task has been accepted, not once it has completed.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closing() {
            return;
        }
        // Never closed explicitly, so acquiring a permit cannot fail.
        let permit = self.semaphore.clone().acquire_owned().await.unwrap();
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.outstanding.clone();
        let idle = self.idle.clone();
        tokio::spawn(async move {
            task.await;
            drop(permit);
            if outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
        });
    }

    /// Waits until no task is outstanding. Safe to call repeatedly; a pool that never had any
    /// outstanding tasks is already idle.
    pub async fn join(&self) {
        while !self.is_idle() {
            self.idle.notified().await;
        }
    }
}

type StatusTask = Box<dyn FnOnce() + Send>;

/// A single-worker executor that runs submitted closures strictly in submission order. This is
/// what gives the scheduler's reporting channel its total-ordering guarantee: two reports can
/// never interleave because there is exactly one worker draining the queue.
pub struct StatusPool {
    sender: mpsc::UnboundedSender<StatusTask>,
    closing: Arc<AtomicBool>,
    outstanding: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl StatusPool {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<StatusTask>();
        let outstanding = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());
        let worker_outstanding = outstanding.clone();
        let worker_idle = idle.clone();
        tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                task();
                if worker_outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
                    worker_idle.notify_waiters();
                }
            }
        });
        StatusPool { sender, closing: Arc::new(AtomicBool::new(false)), outstanding, idle }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Enqueues `task`. A no-op if the pool is closing; the worker task stays alive for the life
    /// of the pool regardless (dropping the sender is what would end it, and we never do that).
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closing() {
            return;
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        // The receiving task only exits when every sender is dropped; ours outlives the pool.
        let _ = self.sender.send(Box::new(task));
    }

    pub async fn join(&self) {
        while !self.is_idle() {
            self.idle.notified().await;
        }
    }
}

impl Default for StatusPool {
    fn default() -> Self {
        StatusPool::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn runner_pool_runs_tasks_and_reports_idle() {
        let pool = RunnerPool::new(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            pool.spawn(async move {
                seen.lock().unwrap().push(i);
            })
            .await;
        }
        pool.join().await;
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn runner_pool_refuses_new_work_once_closed() {
        let pool = RunnerPool::new(1);
        pool.close();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        pool.spawn(async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn status_pool_runs_tasks_in_submission_order() {
        let pool = StatusPool::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            pool.submit(move || order.lock().unwrap().push(i));
        }
        pool.join().await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
