//! Blocking double-ended task queue.
//!
//! The queue backs each [`Worker`](crate::worker::Worker): producers push
//! from any thread, the owning thread blocks in [`TaskQueue::pop`] until an
//! item arrives or the queue closes. High-priority items go to the front.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A mutex-and-condvar protected deque with blocking pop.
pub(crate) struct TaskQueue<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> TaskQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Pushes an item, at the front when `first` is set.
    ///
    /// Items pushed after [`close`](Self::close) are dropped.
    pub(crate) fn push(&self, item: T, first: bool) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            if first {
                inner.items.push_front(item);
            } else {
                inner.items.push_back(item);
            }
        }
        self.ready.notify_one();
    }

    /// Blocks until an item is available or the queue is closed.
    ///
    /// Items queued before the close are still handed out, so a closing
    /// worker drains its backlog before its loop exits.
    pub(crate) fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Closes the queue and wakes every blocked consumer.
    pub(crate) fn close(&self) {
        {
            let mut inner = self.inner.lock();
            inner.closed = true;
        }
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let queue = TaskQueue::new();
        queue.push(1, false);
        queue.push(2, false);
        queue.push(3, false);

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn front_insertion_overtakes() {
        let queue = TaskQueue::new();
        queue.push(1, false);
        queue.push(2, false);
        queue.push(9, true);

        assert_eq!(queue.pop(), Some(9));
        assert_eq!(queue.pop(), Some(1));
    }

    #[test]
    fn pop_blocks_until_push() {
        let queue = Arc::new(TaskQueue::new());

        let producer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(7, false);
        });

        assert_eq!(queue.pop(), Some(7));
        handle.join().unwrap();
    }

    #[test]
    fn close_drains_backlog_then_ends() {
        let queue = TaskQueue::new();
        queue.push(1, false);
        queue.close();
        queue.push(2, false);

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn close_unblocks_waiting_consumer() {
        let queue = Arc::new(TaskQueue::<i32>::new());

        let closer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });

        assert_eq!(queue.pop(), None);
        handle.join().unwrap();
    }
}
