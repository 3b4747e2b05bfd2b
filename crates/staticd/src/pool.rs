//! Fixed-size worker pool fed by a shared task queue

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

use crate::queue::TaskQueue;

/// Reason a task was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The pool has been shut down; the task was dropped unhandled
    ShutDown,
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::ShutDown => write!(f, "Worker pool is shut down"),
        }
    }
}

impl std::error::Error for EnqueueError {}

/// Persistent worker threads that run one handler over queued tasks
///
/// Tasks are owned values; a task dropped without being handled is released
/// by its own `Drop` (for a `TcpStream`, the connection closes).
pub struct WorkerPool<T: Send + 'static> {
    queue: Arc<TaskQueue<T>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    thread_count: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `threads` workers, each calling `handler` on dequeued tasks
    ///
    /// A worker that fails to spawn is logged and skipped; check
    /// [`thread_count`](Self::thread_count) for the achieved concurrency.
    pub fn new<F>(threads: usize, handler: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let queue = Arc::new(TaskQueue::new());
        let handler = Arc::new(handler);
        let mut workers = Vec::with_capacity(threads);

        for id in 0..threads {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);

            let spawned = thread::Builder::new()
                .name(format!("staticd-worker-{}", id))
                .spawn(move || {
                    while let Some(task) = queue.pop() {
                        handler(task);
                    }
                    debug!("Worker {} exiting", id);
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!("Failed to spawn worker {}: {}", id, e),
            }
        }

        let thread_count = workers.len();
        if thread_count < threads {
            warn!("Worker pool running with {} of {} threads", thread_count, threads);
        }

        Self {
            queue,
            workers: Mutex::new(workers),
            thread_count,
        }
    }

    /// Queue a task for the next idle worker
    ///
    /// After [`shutdown`](Self::shutdown) the task is dropped immediately
    /// without reaching the handler.
    pub fn enqueue(&self, task: T) -> Result<(), EnqueueError> {
        match self.queue.push(task) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                drop(rejected);
                debug!("Rejected task after shutdown");
                Err(EnqueueError::ShutDown)
            }
        }
    }

    /// Stop accepting tasks, let workers drain the queue, and join them
    ///
    /// Safe to call repeatedly and from several threads; every caller
    /// returns only once all workers have exited.
    pub fn shutdown(&self) {
        self.queue.close();

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("{} panicked", name);
            }
        }
    }

    /// Number of worker threads actually running
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Check whether shutdown has begun
    pub fn is_shut_down(&self) -> bool {
        self.queue.is_closed()
    }

    /// Number of tasks waiting for a worker
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_pool_runs_every_task() {
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let pool = WorkerPool::new(4, move |n: usize| {
            counter.fetch_add(n, Ordering::SeqCst);
        });

        assert_eq!(pool.thread_count(), 4);
        for _ in 0..100 {
            pool.enqueue(1).unwrap();
        }
        pool.shutdown();

        assert_eq!(handled.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_pool_drains_queue_on_shutdown() {
        let handled = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&handled);
        let pool = WorkerPool::new(1, move |n: u32| {
            thread::sleep(Duration::from_millis(5));
            log.lock().push(n);
        });

        for n in 0..10 {
            pool.enqueue(n).unwrap();
        }
        pool.shutdown();

        assert_eq!(*handled.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_pool_rejects_after_shutdown() {
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let pool = WorkerPool::new(2, move |_: ()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        pool.shutdown();

        assert!(pool.is_shut_down());
        assert_eq!(pool.enqueue(()), Err(EnqueueError::ShutDown));
        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pool_drops_rejected_task() {
        struct Guard(mpsc::Sender<()>);
        impl Drop for Guard {
            fn drop(&mut self) {
                let _ = self.0.send(());
            }
        }

        let pool = WorkerPool::new(1, |_: Guard| panic!("handler must not run"));
        pool.shutdown();

        let (tx, rx) = mpsc::channel();
        assert!(pool.enqueue(Guard(tx)).is_err());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_pool_shutdown_idempotent() {
        let pool = WorkerPool::new(3, |_: u8| {});

        pool.shutdown();
        pool.shutdown();

        assert!(pool.is_shut_down());
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_pool_concurrent_shutdown_waits_for_drain() {
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let pool = Arc::new(WorkerPool::new(2, move |_: u8| {
            thread::sleep(Duration::from_millis(10));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..10 {
            pool.enqueue(0).unwrap();
        }

        let callers: Vec<_> = (0..3)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let handled = Arc::clone(&handled);
                thread::spawn(move || {
                    pool.shutdown();
                    handled.load(Ordering::SeqCst)
                })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.join().unwrap(), 10);
        }
    }

    #[test]
    fn test_pool_handler_runs_outside_queue_lock() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let started_tx = Arc::new(Mutex::new(started_tx));

        let pool = WorkerPool::new(2, move |_: u8| {
            let _ = started_tx.lock().send(());
            let _ = release_rx.lock().recv();
        });

        pool.enqueue(0).unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // First worker is parked inside the handler; the queue still accepts
        pool.enqueue(1).unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        pool.shutdown();
    }
}
