//! One producer-side channel: a shared ring of event buffers, its
//! notification queues, and the ordering lock.
//!
//! Per-slot state machine:
//!
//! ```text
//! Reusable ──claim──▶ Writable ──notify_full──▶ Full ──empty-notify──▶ Reusable
//! ```
//!
//! A slot is in exactly one state at a time: writable by the producer,
//! full and pending drain, or drained and reusable. All channel state is
//! mutated only while holding the ordering lock; the only exception is the
//! `used` counter of the active slot, advanced by the thread that owns the
//! current write range (which is the lock holder or a thread the lock
//! holder handed the range to — never two at once).

use std::cell::UnsafeCell;
use std::fs::OpenOptions;
use std::io;

use memmap2::MmapMut;
use sluice_core::{ChannelConfig, SetupError};

use crate::fifo::{self, FifoKind, IndexRx, IndexTx, FINISHED};
use crate::layout::{region_size, RegionView};
use crate::ticket::TicketLock;

/// Per-slot handoff state, tracked producer-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// The active slot; the producer may append to it.
    Writable,
    /// Announced on the full queue, owned by the consumer until acked.
    Full,
    /// Drained (or never used); may become the active slot.
    Reusable,
}

/// A claimed write range within one slot.
///
/// `start..end` are record indices; the claiming thread writes them in
/// order and publishes progress through the slot's `used` counter.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteRange {
    pub slot: usize,
    pub start: usize,
    pub end: usize,
}

struct ChannelState {
    /// Ring slot currently being filled.
    active: usize,
    slots: Box<[SlotState]>,
    /// Thread id of the last writer, for swap-marker insertion.
    last_writer: Option<u64>,
    /// Producer → consumer slot announcements. `None` in standalone mode.
    full_tx: Option<IndexTx>,
    /// Consumer → producer drain acknowledgements. `None` in standalone mode.
    empty_rx: Option<IndexRx>,
    closed: bool,
}

/// One shared-memory channel (producer side).
///
/// Created by [`Channel::open`]; producer threads interact with it through
/// [`crate::ThreadCursor`], never directly on the hot path.
pub struct Channel {
    index: usize,
    lock: TicketLock,
    region: RegionView,
    state: UnsafeCell<ChannelState>,
    /// Keeps the mapping (or local allocation) alive for `region`.
    _backing: Backing,
}

enum Backing {
    Mapped(MmapMut),
    Local(Box<[u8]>),
}

// SAFETY: `state` is only ever touched by the ordering-lock holder (the
// `state()` accessor asserts this in debug builds), and `region` implements
// its own sharing discipline.
unsafe impl Sync for Channel {}
unsafe impl Send for Channel {}

impl Channel {
    /// Attach to channel `index` under `config`.
    ///
    /// The consumer creates the shared-memory file and both FIFOs; this
    /// side waits for them with bounded backoff, maps the region, and
    /// verifies its size against the configured geometry. In standalone
    /// mode a local region is allocated instead and no consumer is
    /// involved.
    pub fn open(index: usize, config: &ChannelConfig) -> Result<Self, SetupError> {
        let expected = region_size(config.slots_per_channel, config.records_per_slot);

        let (backing, full_tx, empty_rx) = if config.standalone {
            let backing = vec![0u8; expected].into_boxed_slice();
            (Backing::Local(backing), None, None)
        } else {
            let shmem_path = fifo::resource_path(&config.dir, FifoKind::Shmem, index);
            let full_path = fifo::resource_path(&config.dir, FifoKind::Full, index);
            let empty_path = fifo::resource_path(&config.dir, FifoKind::Empty, index);

            for path in [&shmem_path, &full_path, &empty_path] {
                fifo::await_resource(path)?;
            }

            // Open order matters: the consumer opens `empty` for writing
            // first, then `full` for reading. Mirroring that here avoids a
            // rendezvous deadlock between the two blocking opens.
            let empty_rx = IndexRx::open(&empty_path)?;
            let full_tx = IndexTx::open(&full_path)?;

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&shmem_path)?;
            let actual = file.metadata()?.len() as usize;
            if actual != expected {
                return Err(SetupError::Map { expected, actual });
            }
            // SAFETY: the file is kept open by the mapping; both sides
            // agree on its size and layout.
            let map = unsafe { MmapMut::map_mut(&file)? };
            tracing::debug!(channel = index, bytes = expected, "attached shared region");
            (Backing::Mapped(map), Some(full_tx), Some(empty_rx))
        };

        let base = match &backing {
            Backing::Mapped(map) => map.as_ptr() as *mut u8,
            Backing::Local(buf) => buf.as_ptr() as *mut u8,
        };
        // SAFETY: `backing` lives as long as the channel and is exactly
        // `expected` bytes; access discipline is documented on RegionView.
        let region = unsafe {
            RegionView::new(
                base,
                expected,
                config.slots_per_channel,
                config.records_per_slot,
            )
        }
        .map_err(|needed| SetupError::Map {
            expected: needed,
            actual: expected,
        })?;

        Ok(Self {
            index,
            lock: TicketLock::new(),
            region,
            state: UnsafeCell::new(ChannelState {
                active: 0,
                slots: vec![SlotState::Reusable; config.slots_per_channel].into_boxed_slice(),
                last_writer: None,
                full_tx,
                empty_rx,
                closed: false,
            }),
            _backing: backing,
        })
    }

    /// Channel index within the registry.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The ordering lock serializing producer threads on this channel.
    pub(crate) fn ordering_lock(&self) -> &TicketLock {
        &self.lock
    }

    pub(crate) fn region(&self) -> &RegionView {
        &self.region
    }

    /// Access the lock-protected state.
    ///
    /// # Safety
    ///
    /// The caller must hold the ordering lock as `owner`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn state(&self, owner: u64) -> &mut ChannelState {
        debug_assert!(
            self.lock.is_held_by(owner),
            "channel state touched without the ordering lock"
        );
        // SAFETY: exclusive access guaranteed by the ordering lock.
        unsafe { &mut *self.state.get() }
    }

    /// Claim a write range with at least `required` free records.
    ///
    /// Must be called with the ordering lock held as `owner`. Rotates the
    /// ring as needed, blocking on the empty queue when the next slot has
    /// not been drained yet. Steady-state queue I/O failures are fatal:
    /// this path is load-bearing for trace fidelity and has no degraded
    /// mode.
    pub(crate) fn claim(&self, owner: u64, required: usize) -> WriteRange {
        assert!(
            required <= self.region.records_per_slot(),
            "batch of {required} records exceeds slot capacity {}",
            self.region.records_per_slot()
        );
        // SAFETY: contract of this function.
        let state = unsafe { self.state(owner) };

        if state.slots[state.active] == SlotState::Writable {
            let used = self.region.used(state.active) as usize;
            if self.region.records_per_slot() - used >= required {
                return WriteRange {
                    slot: state.active,
                    start: used,
                    end: self.region.records_per_slot(),
                };
            }
            self.announce_active(state);
        }

        // The ring advanced (or was never started); wait for the new
        // active slot to come back from the consumer if it hasn't yet.
        while state.slots[state.active] != SlotState::Reusable {
            // Unreachable in standalone mode: announce_active recycles.
            let msg = state
                .empty_rx
                .as_mut()
                .expect("standalone channel exhausted its ring")
                .recv();
            match msg {
                Ok(Some(idx)) => {
                    let idx = idx as usize;
                    assert!(idx < state.slots.len(), "consumer acked bogus slot {idx}");
                    assert_eq!(
                        state.slots[idx],
                        SlotState::Full,
                        "consumer acked slot {idx} it was never handed"
                    );
                    state.slots[idx] = SlotState::Reusable;
                }
                Ok(None) => panic!("consumer closed empty queue while producer is live"),
                Err(e) => panic!("empty queue read failed: {e}"),
            }
        }

        state.slots[state.active] = SlotState::Writable;
        self.region.set_used(state.active, 0);
        WriteRange {
            slot: state.active,
            start: 0,
            end: self.region.records_per_slot(),
        }
    }

    /// Announce a non-empty active slot as full and advance the ring.
    ///
    /// Empty slots are never announced: a forced flush with nothing
    /// written must not emit a spurious notification.
    pub(crate) fn flush_active(&self, owner: u64) {
        // SAFETY: contract as in `claim`.
        let state = unsafe { self.state(owner) };
        if state.slots[state.active] == SlotState::Writable && self.region.used(state.active) > 0 {
            self.announce_active(state);
        }
    }

    /// Record the identity of the writing thread, returning `true` when it
    /// changed and a swap marker must precede the new thread's records.
    pub(crate) fn note_writer(&self, owner: u64) -> bool {
        // SAFETY: contract as in `claim`.
        let state = unsafe { self.state(owner) };
        if state.last_writer == Some(owner) {
            false
        } else {
            state.last_writer = Some(owner);
            true
        }
    }

    fn announce_active(&self, state: &mut ChannelState) {
        let slot = state.active;
        debug_assert_eq!(state.slots[slot], SlotState::Writable);
        match state.full_tx.as_mut() {
            Some(tx) => {
                if let Err(e) = tx.send(slot as u32) {
                    panic!("full queue write failed: {e}");
                }
                state.slots[slot] = SlotState::Full;
                tracing::trace!(
                    channel = self.index,
                    slot,
                    used = self.region.used(slot),
                    "slot announced full"
                );
            }
            // Standalone: nothing drains, recycle immediately.
            None => state.slots[slot] = SlotState::Reusable,
        }
        state.active = (state.active + 1) & (state.slots.len() - 1);
    }

    /// Termination handshake.
    ///
    /// Flushes a partially filled active slot, writes the `FINISHED`
    /// sentinel followed by the last active index, then blocks until the
    /// consumer closes its end of the empty queue — proof it has observed
    /// everything — before releasing any resources.
    pub fn close(&self) -> io::Result<()> {
        // The closer takes its turn through the same fair queue as any
        // producer thread.
        let owner = close_owner_id();
        self.lock.acquire(owner);
        // SAFETY: lock held.
        let state = unsafe { self.state(owner) };
        if state.closed {
            self.lock.release(owner);
            return Ok(());
        }
        state.closed = true;

        if state.slots[state.active] == SlotState::Writable && self.region.used(state.active) > 0 {
            self.announce_active(state);
        }

        if let Some(tx) = state.full_tx.as_mut() {
            tracing::debug!(channel = self.index, "disconnecting");
            tx.send(FINISHED)?;
            tx.send(state.active as u32)?;

            let rx = state
                .empty_rx
                .as_mut()
                .expect("connected channel missing empty queue");
            // Drain acks until EOF; the consumer closes its end once it
            // has observed the sentinel.
            while rx.recv()?.is_some() {}
            tracing::debug!(channel = self.index, "disconnected");
        }

        state.full_tx = None;
        state.empty_rx = None;
        self.lock.release(owner);
        Ok(())
    }
}

/// Owner id used by `close`; distinct from any producer thread id, which
/// are small sequential values in practice.
fn close_owner_id() -> u64 {
    u64::MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{ChannelConfig, EventRecord};

    fn standalone_config(slots: usize, records: usize) -> ChannelConfig {
        let mut cfg = ChannelConfig::new("/unused", 1);
        cfg.slots_per_channel = slots;
        cfg.records_per_slot = records;
        cfg.standalone = true;
        cfg
    }

    fn write_range(ch: &Channel, range: WriteRange, n: usize, mk: impl Fn(usize) -> EventRecord) {
        for i in 0..n {
            unsafe { ch.region().record_ptr(range.slot, range.start + i).write(mk(i)) };
            ch.region()
                .set_used(range.slot, (range.start + i + 1) as u32);
        }
    }

    #[test]
    fn first_claim_starts_at_slot_zero() {
        let ch = Channel::open(0, &standalone_config(4, 8)).unwrap();
        ch.ordering_lock().acquire(1);
        let range = ch.claim(1, 8);
        assert_eq!((range.slot, range.start, range.end), (0, 0, 8));
        ch.ordering_lock().release(1);
    }

    #[test]
    fn standalone_ring_recycles_forever() {
        let ch = Channel::open(0, &standalone_config(4, 4)).unwrap();
        ch.ordering_lock().acquire(1);
        // Ten full rotations; a connected channel would block without a
        // consumer, standalone must not.
        for round in 0..10 {
            let range = ch.claim(1, 4);
            assert_eq!(range.slot, round % 4);
            write_range(&ch, range, 4, |i| EventRecord::instr(i as u64));
        }
        ch.ordering_lock().release(1);
    }

    #[test]
    fn partial_claims_share_a_slot() {
        let ch = Channel::open(0, &standalone_config(4, 8)).unwrap();
        ch.ordering_lock().acquire(1);
        let a = ch.claim(1, 3);
        write_range(&ch, a, 3, |i| EventRecord::instr(i as u64));
        let b = ch.claim(1, 3);
        assert_eq!(b.slot, a.slot);
        assert_eq!(b.start, 3);
        ch.ordering_lock().release(1);
    }

    #[test]
    fn note_writer_reports_changes_once() {
        let ch = Channel::open(0, &standalone_config(4, 8)).unwrap();
        ch.ordering_lock().acquire(1);
        assert!(ch.note_writer(1));
        assert!(!ch.note_writer(1));
        ch.ordering_lock().release(1);
        ch.ordering_lock().acquire(2);
        assert!(ch.note_writer(2));
        ch.ordering_lock().release(2);
    }

    #[test]
    #[should_panic(expected = "exceeds slot capacity")]
    fn oversized_claim_is_fatal() {
        let ch = Channel::open(0, &standalone_config(4, 8)).unwrap();
        ch.ordering_lock().acquire(1);
        ch.claim(1, 9);
    }

    #[test]
    fn standalone_close_is_idempotent() {
        let ch = Channel::open(0, &standalone_config(4, 8)).unwrap();
        ch.close().unwrap();
        ch.close().unwrap();
    }
}
