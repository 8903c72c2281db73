//! Byte layout of the shared region and a typed, bounds-checked view.
//!
//! The region is header-less: `slots` buffers back to back, each one a
//! `used` counter padded to record alignment followed by a fixed array of
//! records:
//!
//! ```text
//! ┌─ slot 0 ──────────────────────────┬─ slot 1 ─────────── ...
//! │ used: u32 │ pad │ [EventRecord; records_per_slot] │ ...
//! └───────────────────────────────────┴──────────────────── ...
//! ```
//!
//! All offset math lives in [`RegionView`], constructed once at map time.
//! Call sites never do pointer arithmetic; every accessor bounds-checks its
//! slot and record indices.

use sluice_core::{EventRecord, RECORD_SIZE};

/// Bytes reserved at the start of each slot for the `used` counter,
/// padded so the record array stays 8-byte aligned.
pub const SLOT_HEADER_SIZE: usize = 8;

/// Byte stride of one slot.
#[inline]
pub fn slot_stride(records_per_slot: usize) -> usize {
    SLOT_HEADER_SIZE + records_per_slot * RECORD_SIZE
}

/// Total size in bytes of a channel's shared region.
#[inline]
pub fn region_size(slots: usize, records_per_slot: usize) -> usize {
    slots * slot_stride(records_per_slot)
}

/// A typed view over one channel's shared region.
///
/// The view holds a raw base pointer; whoever constructs it keeps the
/// backing mapping alive for as long as the view is used. The `used`
/// counter is accessed with volatile loads/stores because the other
/// process reads it: the full-notify FIFO message orders the accesses, but
/// the compiler must not cache the value across that boundary.
#[derive(Debug)]
pub struct RegionView {
    base: *mut u8,
    slots: usize,
    records_per_slot: usize,
}

// SAFETY: the view is a window onto process-shared memory; which side may
// touch which slot is governed by the handoff protocol (producer writes
// only the slot it claimed under the ordering lock, the consumer reads
// only slots announced as full), not by &/&mut rules.
unsafe impl Send for RegionView {}
unsafe impl Sync for RegionView {}

impl RegionView {
    /// Build a view over `len` bytes at `base`.
    ///
    /// Fails if `len` does not match the configured geometry exactly.
    ///
    /// # Safety
    ///
    /// `base..base + len` must be valid for reads and writes for the
    /// lifetime of the view, and all access must follow the handoff
    /// protocol described above.
    pub unsafe fn new(
        base: *mut u8,
        len: usize,
        slots: usize,
        records_per_slot: usize,
    ) -> Result<Self, usize> {
        let expected = region_size(slots, records_per_slot);
        if len != expected {
            return Err(expected);
        }
        Ok(Self {
            base,
            slots,
            records_per_slot,
        })
    }

    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    #[inline]
    pub fn records_per_slot(&self) -> usize {
        self.records_per_slot
    }

    #[inline]
    fn slot_base(&self, slot: usize) -> *mut u8 {
        assert!(slot < self.slots, "slot index {slot} out of range");
        // SAFETY: slot is in range, so the offset stays inside the region.
        unsafe { self.base.add(slot * slot_stride(self.records_per_slot)) }
    }

    /// Read the `used` counter of `slot`.
    #[inline]
    pub fn used(&self, slot: usize) -> u32 {
        // SAFETY: slot_base is in-bounds and u32-aligned (stride and base
        // are 8-byte aligned).
        unsafe { (self.slot_base(slot) as *const u32).read_volatile() }
    }

    /// Write the `used` counter of `slot`.
    ///
    /// Only the producer thread currently owning the slot may call this.
    #[inline]
    pub fn set_used(&self, slot: usize, n: u32) {
        assert!(
            n as usize <= self.records_per_slot,
            "used count {n} exceeds slot capacity"
        );
        // SAFETY: as in `used`.
        unsafe { (self.slot_base(slot) as *mut u32).write_volatile(n) }
    }

    /// Pointer to record `idx` of `slot`.
    ///
    /// The caller writes through this only while it owns the slot's write
    /// range under the ordering lock.
    #[inline]
    pub fn record_ptr(&self, slot: usize, idx: usize) -> *mut EventRecord {
        assert!(
            idx < self.records_per_slot,
            "record index {idx} out of range"
        );
        // SAFETY: both indices are in range; the record array starts
        // SLOT_HEADER_SIZE bytes into the slot.
        unsafe {
            self.slot_base(slot)
                .add(SLOT_HEADER_SIZE + idx * RECORD_SIZE)
                .cast::<EventRecord>()
        }
    }

    /// Read the first `n` records of `slot`.
    ///
    /// # Safety
    ///
    /// The slot must have been handed to this side (announced full and not
    /// yet acknowledged), with `n` taken from its `used` counter. Record
    /// validity is trusted: the peer is cooperative by protocol.
    pub unsafe fn records(&self, slot: usize, n: usize) -> &[EventRecord] {
        assert!(n <= self.records_per_slot, "read of {n} records exceeds slot");
        let first = self.record_ptr(slot, 0);
        // SAFETY: contiguous in-bounds records, initialized by the producer
        // up to `used`, and not mutated again until we acknowledge the slot.
        unsafe { std::slice::from_raw_parts(first, n) }
    }
}
