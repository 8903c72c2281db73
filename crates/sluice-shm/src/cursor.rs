//! Per-thread direct-write cursor into the channel's active buffer.
//!
//! A `ThreadCursor` is exclusively owned by its producer thread. The
//! append hot path is a bounds check, a raw record write, and a volatile
//! counter store — no lock, no allocation, no system call. The ordering
//! lock is taken only when the cursor runs out of claimed space, and is
//! then *retained* across subsequent appends so steady-state tracing stays
//! on the fast path; it is handed off through the fair queue whenever
//! other threads are waiting, and released entirely by `force_flush`.

use std::marker::PhantomData;
use std::sync::Arc;

use sluice_core::EventRecord;

use crate::channel::Channel;

/// A producer thread's write cursor.
///
/// Created via [`crate::ChannelRegistry::cursor`]. Not `Send`/`Sync`: it
/// belongs to exactly one thread.
pub struct ThreadCursor {
    channel: Arc<Channel>,
    thread_id: u64,
    /// Claimed range: slot plus next/one-past-end record indices.
    slot: usize,
    next: usize,
    end: usize,
    holds_lock: bool,
    _not_send: PhantomData<*mut ()>,
}

impl ThreadCursor {
    pub(crate) fn new(channel: Arc<Channel>, thread_id: u64) -> Self {
        Self {
            channel,
            thread_id,
            slot: 0,
            next: 0,
            end: 0,
            holds_lock: false,
            _not_send: PhantomData,
        }
    }

    /// Id of the owning thread.
    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Append one record.
    ///
    /// Writes in place when the claimed range has room; otherwise claims a
    /// fresh range first (the only per-record branch), which may block on
    /// the ordering lock or on consumer backpressure.
    #[inline]
    pub fn append(&mut self, record: EventRecord) {
        if self.next == self.end {
            self.refill();
        }
        // SAFETY: `slot`/`next` lie inside the range claimed for this
        // thread under the ordering lock; nobody else writes it.
        unsafe {
            self.channel
                .region()
                .record_ptr(self.slot, self.next)
                .write(record);
        }
        self.next += 1;
        self.channel.region().set_used(self.slot, self.next as u32);
    }

    /// Publish the current buffer (if non-empty) and release the channel.
    ///
    /// Call before the owning thread blocks on application-level
    /// synchronization (mutex, join, barrier) and at thread exit, so a
    /// partial trace is not held hostage while the thread sleeps and other
    /// threads are not starved behind its lock ownership. A no-op when
    /// nothing has been written since the last claim.
    pub fn force_flush(&mut self) {
        if !self.holds_lock {
            debug_assert_eq!(self.next, self.end, "claimed range without the lock");
            return;
        }
        self.channel.flush_active(self.thread_id);
        self.channel.ordering_lock().release(self.thread_id);
        self.holds_lock = false;
        self.reset_range();
    }

    /// Acquire (or fairly re-acquire) the lock and claim a fresh range.
    #[cold]
    fn refill(&mut self) {
        let lock = self.channel.ordering_lock();
        if self.holds_lock {
            // Exhausted our range while holding the lock. Hand it off if
            // anyone is queued so one busy thread cannot dominate the
            // channel; we rejoin at the tail like everybody else.
            if lock.has_waiters() {
                lock.release(self.thread_id);
                lock.acquire(self.thread_id);
            }
        } else {
            lock.acquire(self.thread_id);
            self.holds_lock = true;
        }

        // Another thread may have written since we last held the lock;
        // mark the ownership change before our records so the consumer
        // can attribute them.
        if self.channel.note_writer(self.thread_id) {
            let marker = self.channel.claim(self.thread_id, 1);
            // SAFETY: range just claimed under the lock.
            unsafe {
                self.channel
                    .region()
                    .record_ptr(marker.slot, marker.start)
                    .write(EventRecord::swap_marker(self.thread_id));
            }
            self.channel
                .region()
                .set_used(marker.slot, (marker.start + 1) as u32);
        }

        let range = self.channel.claim(self.thread_id, 1);
        self.slot = range.slot;
        self.next = range.start;
        self.end = range.end;
    }

    fn reset_range(&mut self) {
        self.slot = 0;
        self.next = 0;
        self.end = 0;
    }
}

impl Drop for ThreadCursor {
    fn drop(&mut self) {
        self.force_flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::ChannelConfig;

    fn standalone_cursor(slots: usize, records: usize) -> ThreadCursor {
        let mut cfg = ChannelConfig::new("/unused", 1);
        cfg.slots_per_channel = slots;
        cfg.records_per_slot = records;
        cfg.standalone = true;
        let channel = Arc::new(Channel::open(0, &cfg).unwrap());
        ThreadCursor::new(channel, 1)
    }

    #[test]
    fn appends_fill_and_rotate_without_consumer() {
        let mut cursor = standalone_cursor(4, 8);
        for pc in 0..100 {
            cursor.append(EventRecord::instr(pc));
        }
        cursor.force_flush();
    }

    #[test]
    fn first_append_claims_lock_and_emits_marker() {
        let mut cursor = standalone_cursor(4, 8);
        cursor.append(EventRecord::instr(0));
        assert!(cursor.channel.ordering_lock().is_held_by(1));
        // Slot 0 holds the swap marker plus the record.
        assert_eq!(cursor.channel.region().used(0), 2);
        let records = unsafe { cursor.channel.region().records(0, 2) };
        assert!(records[0].is_swap_marker());
        assert_eq!(records[1], EventRecord::instr(0));
    }

    #[test]
    fn force_flush_without_writes_is_a_no_op() {
        let mut cursor = standalone_cursor(4, 8);
        cursor.force_flush(); // never claimed anything
        assert!(!cursor.channel.ordering_lock().is_held_by(1));
    }

    #[test]
    fn flush_releases_lock_and_next_append_reclaims() {
        let mut cursor = standalone_cursor(4, 8);
        cursor.append(EventRecord::instr(1));
        cursor.force_flush();
        assert!(!cursor.channel.ordering_lock().is_held_by(1));
        cursor.append(EventRecord::instr(2));
        assert!(cursor.channel.ordering_lock().is_held_by(1));
    }
}
