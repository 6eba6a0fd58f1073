//! Blocking FIFO queue shared by the unit producer and the single consumer.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    running: bool,
}

/// Unbounded FIFO with shutdown.
///
/// After [`shutdown`](Self::shutdown) no new items are accepted, but items
/// already queued are still handed out; `pop_blocking` returns `None` only
/// once the queue is both shut down and drained.
#[derive(Debug)]
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
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                running: true,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item and wake one waiting consumer.
    ///
    /// Returns `false` (dropping the item) once the queue has been shut down.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        if !state.running {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Block until an item is available or the queue is shut down and empty.
    pub fn pop_blocking(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if !state.running {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop accepting items and wake every waiter.
    pub fn shutdown(&self) {
        self.lock().running = false;
        self.available.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
