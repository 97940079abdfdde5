//! Fixed-capacity FIFO replay buffer
//!
//! Single internal mutex guards a `VecDeque`; appends and reads can both come
//! from different tasks (publisher vs. a subscribing connection) so the guard
//! stays even though each topic has only one writer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::message::Message;

pub struct RingBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<Arc<Message>>>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Append a message, evicting the oldest entry if the buffer is full.
    pub fn append(&self, msg: Arc<Message>) {
        let mut guard = self.inner.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(msg);
    }

    /// Last `min(n, len())` messages, oldest first. `n` above capacity is
    /// clamped silently; `n == 0` returns an empty list.
    pub fn tail(&self, n: usize) -> Vec<Arc<Message>> {
        if n == 0 {
            return Vec::new();
        }
        let guard = self.inner.lock();
        let n = n.min(guard.len());
        guard.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
