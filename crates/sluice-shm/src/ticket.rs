//! The FIFO-fair ordering lock serializing producer threads on a channel.
//!
//! Implemented as an explicit wait-queue of per-waiter nodes: a thread
//! that finds the lock free and the queue empty becomes the owner
//! immediately; otherwise it appends a node and parks on that node's
//! condvar. `release` hands ownership directly to the queue head before
//! waking it, so a late arriver can never barge past a parked waiter and
//! acquisition order is exactly request order.
//!
//! There is no recursion: an owner that wants the lock back after an
//! unrelated blocking operation releases and re-joins the queue, which
//! keeps one thread from dominating the channel under contention.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct Waiter {
    /// Thread id this node was enqueued for.
    owner: u64,
    granted: Mutex<bool>,
    cv: Condvar,
}

struct Inner {
    /// Current owner's thread id, if held.
    owner: Option<u64>,
    queue: VecDeque<Arc<Waiter>>,
}

/// A FIFO-fair mutual-exclusion primitive scoped to one channel.
///
/// Owner identity is an arbitrary caller-chosen `u64` (the producer thread
/// id); it is bookkeeping for assertions and handoff, not a capability.
pub struct TicketLock {
    inner: Mutex<Inner>,
}

impl TicketLock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                owner: None,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Block until `owner` holds the lock.
    ///
    /// Returns only after exclusive ownership is granted; waiters are
    /// served strictly in arrival order.
    pub fn acquire(&self, owner: u64) {
        let waiter = {
            let mut inner = self.inner.lock();
            if inner.owner.is_none() && inner.queue.is_empty() {
                inner.owner = Some(owner);
                return;
            }
            let waiter = Arc::new(Waiter {
                owner,
                granted: Mutex::new(false),
                cv: Condvar::new(),
            });
            inner.queue.push_back(Arc::clone(&waiter));
            waiter
        };

        let mut granted = waiter.granted.lock();
        while !*granted {
            waiter.cv.wait(&mut granted);
        }
        // Ownership was transferred by the releaser; nothing left to do.
    }

    /// Release the lock held by `owner`, waking the next waiter if any.
    pub fn release(&self, owner: u64) {
        let next = {
            let mut inner = self.inner.lock();
            assert_eq!(
                inner.owner,
                Some(owner),
                "ordering lock released by non-owner"
            );
            match inner.queue.pop_front() {
                Some(next) => {
                    // Hand off before waking: a thread calling `acquire`
                    // in this window sees an owner and queues behind.
                    inner.owner = Some(next.owner);
                    Some(next)
                }
                None => {
                    inner.owner = None;
                    None
                }
            }
        };
        if let Some(next) = next {
            *next.granted.lock() = true;
            next.cv.notify_one();
        }
    }

    /// Whether any thread is queued behind the current owner.
    pub fn has_waiters(&self) -> bool {
        !self.inner.lock().queue.is_empty()
    }

    /// Number of queued waiters (excluding the owner).
    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Whether `owner` currently holds the lock.
    pub fn is_held_by(&self, owner: u64) -> bool {
        self.inner.lock().owner == Some(owner)
    }
}

impl Default for TicketLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn uncontended_acquire_is_immediate() {
        let lock = TicketLock::new();
        lock.acquire(1);
        assert!(lock.is_held_by(1));
        assert!(!lock.has_waiters());
        lock.release(1);
        assert!(!lock.is_held_by(1));
    }

    #[test]
    #[should_panic(expected = "non-owner")]
    fn release_by_non_owner_is_fatal() {
        let lock = TicketLock::new();
        lock.acquire(1);
        lock.release(2);
    }

    #[test]
    fn waiters_acquire_in_request_order() {
        let lock = Arc::new(TicketLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        // Hold the lock while building a queue of known shape.
        lock.acquire(0);

        let mut handles = Vec::new();
        for id in 1..=4u64 {
            // Wait until thread `id` is provably enqueued before spawning
            // the next, so request order is deterministic.
            let thread_lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            handles.push(std::thread::spawn(move || {
                thread_lock.acquire(id);
                order.lock().push(id);
                thread_lock.release(id);
            }));
            while lock.queue_len() < id as usize {
                std::thread::yield_now();
            }
        }

        lock.release(0);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn handoff_transfers_ownership_directly() {
        let lock = Arc::new(TicketLock::new());
        let acquired = Arc::new(AtomicUsize::new(0));

        lock.acquire(7);
        let waiter = std::thread::spawn({
            let lock = Arc::clone(&lock);
            let acquired = Arc::clone(&acquired);
            move || {
                lock.acquire(8);
                acquired.store(1, Ordering::SeqCst);
                lock.release(8);
            }
        });
        while lock.queue_len() < 1 {
            std::thread::yield_now();
        }
        assert_eq!(acquired.load(Ordering::SeqCst), 0);
        lock.release(7);
        waiter.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    }
}
