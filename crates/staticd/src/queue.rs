//! Closable FIFO task queue

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct QueueState<T> {
    tasks: VecDeque<T>,
    closed: bool,
}

/// Unbounded FIFO with blocking pop
///
/// Once closed, pushes are refused but tasks already queued can still be
/// popped. `pop` returns `None` only when the queue is closed and drained.
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    /// Create an empty, open queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append a task, handing it back if the queue is closed
    pub fn push(&self, task: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(task);
        }
        state.tasks.push_back(task);
        self.available.notify_one();
        Ok(())
    }

    /// Block until a task is available or the queue is closed and empty
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Refuse further pushes and wake every waiter
    ///
    /// Returns `true` only for the call that actually closed the queue.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        self.available.notify_all();
        true
    }

    /// Check whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Check if no tasks are queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }
}
