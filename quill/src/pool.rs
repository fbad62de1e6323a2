//! Generic available/busy object cache, instantiated once per pooled
//! resource kind.

use std::collections::VecDeque;

use crate::error::Result;

/// A FIFO cache of reusable queue-owned objects.
///
/// Every pooled object is owned by exactly one of: the available list, the
/// busy list, or the caller that acquired it and has not yet committed it.
/// Both lists are FIFO because the underlying queue completes submissions
/// strictly in submission order, so reclamation never needs to search.
pub(crate) struct ResourcePool<T> {
    available: VecDeque<T>,
    busy: VecDeque<T>,
}

impl<T> Default for ResourcePool<T> {
    fn default() -> ResourcePool<T> {
        ResourcePool {
            available: VecDeque::new(),
            busy: VecDeque::new(),
        }
    }
}

impl<T> ResourcePool<T> {
    /// Pops the oldest available object, or constructs a new one. A
    /// construction failure is returned untouched; the pool never retries.
    pub fn acquire_with(&mut self, construct: impl FnOnce() -> Result<T>) -> Result<T> {
        match self.available.pop_front() {
            Some(item) => Ok(item),
            None => construct(),
        }
    }

    /// Hands an acquired object over to the busy list once it has been
    /// attached to a forwarded submission. Commit order must equal
    /// acquisition order.
    pub fn commit(&mut self, item: T) -> &mut T {
        self.busy.push_back(item);
        self.busy.back_mut().unwrap()
    }

    /// Returns an acquired object that was never submitted straight to the
    /// available list.
    pub fn cancel(&mut self, item: T) {
        self.available.push_back(item);
    }

    /// Returns an object held outside the pool (a pending record's fence).
    pub fn release(&mut self, item: T) {
        self.available.push_back(item);
    }

    /// Moves the `count` oldest busy objects back to available, running
    /// `recycle` on each. A recycle failure does not stop the pass; every
    /// object still moves back and the first error is reported once the
    /// pass is done. Reclaiming more than is busy is a protocol violation.
    pub fn reclaim(&mut self, count: usize, mut recycle: impl FnMut(&mut T) -> Result<()>) -> Result<()> {
        debug_assert!(count <= self.busy.len(), "reclaiming more than was acquired");
        let mut first_err = None;
        for _ in 0..count.min(self.busy.len()) {
            let mut item = self.busy.pop_front().unwrap();
            if let Err(err) = recycle(&mut item) {
                first_err.get_or_insert(err);
            }
            self.available.push_back(item);
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn available_len(&self) -> usize {
        self.available.len()
    }

    pub fn busy_len(&self) -> usize {
        self.busy.len()
    }

    /// Drops every pooled object. All owning submissions must have been
    /// waited on and reclaimed first.
    pub fn teardown(&mut self) {
        debug_assert!(self.busy.is_empty(), "tearing down a pool with busy objects");
        self.available.clear();
        self.busy.clear();
    }
}
