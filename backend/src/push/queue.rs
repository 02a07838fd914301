// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::VecDeque;
use std::sync::Mutex;

/// A FIFO queue bounded by `max_size` (§3, §5): enqueue past the bound fails
/// synchronously rather than blocking, the sole back-pressure mechanism.
/// The lock is never held across an `.await` point.
pub struct BoundedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    max_size: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(max_size.min(256))),
            max_size,
        }
    }

    /// Returns `item` back on failure so the caller can decide whether to
    /// drop it or surface `QueueFull` to its own caller.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= self.max_size {
            return Err(item);
        }
        queue.push_back(item);
        Ok(())
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_push_past_bound() {
        let queue = BoundedQueue::new(2);
        assert!(queue.try_push(1).is_ok());
        assert!(queue.try_push(2).is_ok());
        assert_eq!(queue.try_push(3), Err(3));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn pops_in_fifo_order() {
        let queue = BoundedQueue::new(4);
        queue.try_push('a').unwrap();
        queue.try_push('b').unwrap();
        assert_eq!(queue.pop(), Some('a'));
        assert_eq!(queue.pop(), Some('b'));
        assert_eq!(queue.pop(), None);
    }
}
