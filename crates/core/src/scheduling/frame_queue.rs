use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Buffer of frames waiting to be scanned.
///
/// The two insertion modes order items differently and callers rely on it:
/// - [`add`](Self::add) puts a single item at the **front**, so the most
///   recently added item is the next one [`remove_first`](Self::remove_first)
///   returns (`add(1); add(2); add(3)` drains as `3, 2, 1`).
/// - [`add_array`](Self::add_array) appends a batch at the **back** in the
///   given order.
///
/// Removing from an empty queue yields `None` or an empty `Vec`.
#[derive(Debug, Clone)]
pub struct FrameQueue<T> {
    items: VecDeque<T>,
}

/// Queue handle shared between a frame producer and the scan consumer.
pub type SharedFrameQueue<T> = Arc<Mutex<FrameQueue<T>>>;

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn shared() -> SharedFrameQueue<T> {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn add(&mut self, item: T) {
        self.items.push_front(item);
    }

    pub fn add_array<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.items.extend(items);
    }

    pub fn remove_first(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Removes up to `amount` items from the front, in queue order.
    pub fn remove_first_many(&mut self, amount: usize) -> Vec<T> {
        let n = amount.min(self.items.len());
        self.items.drain(..n).collect()
    }

    pub fn remove_last(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    /// Removes up to `amount` items from the back, in queue order.
    pub fn remove_last_many(&mut self, amount: usize) -> Vec<T> {
        let start = self.items.len().saturating_sub(amount);
        self.items.drain(start..).collect()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Locks a shared queue, recovering the data if a producer panicked mid-push.
pub fn lock<T>(queue: &SharedFrameQueue<T>) -> MutexGuard<'_, FrameQueue<T>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
