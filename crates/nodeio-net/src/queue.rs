//! Shared inbound FIFO: mutex + condition variable.
//!
//! The reactor pushes and broadcasts; workers pop with a bounded wait so
//! they notice the exit flag even when no traffic arrives.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
pub struct InboundQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Default for InboundQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InboundQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        self.ready.notify_all();
    }

    /// Pop the head, waiting at most `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut items = self.lock();
        if let Some(item) = items.pop_front() {
            return Some(item);
        }
        let (mut items, _) = self
            .ready
            .wait_timeout(items, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        items.pop_front()
    }

    /// Remove everything, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_fifo_order() {
        let q = InboundQueue::new();
        for i in 0..4 {
            q.push(i);
        }
        assert_eq!(q.len(), 4);
        assert_eq!(q.pop_timeout(Duration::ZERO), Some(0));
        assert_eq!(q.drain(), vec![1, 2, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_pop_times_out() {
        let q: InboundQueue<u32> = InboundQueue::new();
        let start = Instant::now();
        assert_eq!(q.pop_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_push_wakes_waiter() {
        let q = Arc::new(InboundQueue::new());
        let q2 = Arc::clone(&q);
        let waiter = thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if let Some(v) = q2.pop_timeout(Duration::from_millis(100)) {
                    return Some(v);
                }
            }
            None
        });
        thread::sleep(Duration::from_millis(10));
        q.push(7u32);
        assert_eq!(waiter.join().unwrap(), Some(7));
    }

    #[test]
    fn test_each_item_popped_once() {
        let q = Arc::new(InboundQueue::new());
        for i in 0..1000u32 {
            q.push(i);
        }
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(v) = q.pop_timeout(Duration::from_millis(1)) {
                        got.push(v);
                    }
                    got
                })
            })
            .collect();
        let mut all: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }
}
