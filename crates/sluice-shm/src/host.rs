//! The consumer side of a channel.
//!
//! The host creates the rendezvous resources (shared-memory file plus the
//! two FIFOs) *before* the producer attaches, then drains: block on the
//! full queue, copy the announced slot's records out, acknowledge the slot
//! on the empty queue. Dropping the host closes its queue ends; the
//! producer's termination handshake completes when it observes that EOF.
//!
//! One host serves one channel; run one per channel (the drain loop is
//! deliberately single-threaded, matching the one-consumer-per-channel
//! protocol).

use std::fs::OpenOptions;
use std::io;

use memmap2::MmapMut;
use sluice_core::{ChannelConfig, EventRecord, SetupError};

use crate::fifo::{self, FifoKind, IndexRx, IndexTx, FINISHED};
use crate::layout::{region_size, RegionView};

/// Result of draining one notification.
#[derive(Debug)]
pub enum Drained {
    /// Records copied out of one announced slot (already acknowledged).
    Events(Vec<EventRecord>),
    /// The producer sent the termination sentinel; no more data follows.
    Finished {
        /// The producer's active slot index at shutdown.
        last_slot: usize,
    },
}

/// Consumer end of one channel.
pub struct ChannelHost {
    index: usize,
    region: RegionView,
    full_rx: IndexRx,
    empty_tx: Option<IndexTx>,
    finished: bool,
    /// Keeps the mapping alive for `region`.
    _map: MmapMut,
}

impl ChannelHost {
    /// Create the channel's shared resources and wait for the producer.
    ///
    /// Creates the sized shared-memory file and both FIFOs under
    /// `config.dir`, then blocks until the producer opens its ends.
    pub fn create(index: usize, config: &ChannelConfig) -> Result<Self, SetupError> {
        let expected = region_size(config.slots_per_channel, config.records_per_slot);

        let shmem_path = fifo::resource_path(&config.dir, FifoKind::Shmem, index);
        let full_path = fifo::resource_path(&config.dir, FifoKind::Full, index);
        let empty_path = fifo::resource_path(&config.dir, FifoKind::Empty, index);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&shmem_path)?;
        file.set_len(expected as u64)?;
        fifo::create_fifo(&full_path)?;
        fifo::create_fifo(&empty_path)?;
        tracing::debug!(channel = index, dir = %config.dir.display(), "channel resources created");

        // Counterpart of the producer's open order (it opens `empty` for
        // reading first, then `full` for writing); both opens block until
        // the peer arrives.
        let empty_tx = IndexTx::open(&empty_path)?;
        let full_rx = IndexRx::open(&full_path)?;

        // SAFETY: file is kept open by the mapping and sized above.
        let map = unsafe { MmapMut::map_mut(&file)? };
        // SAFETY: mapping covers exactly `expected` bytes and lives in
        // `_map` alongside the view.
        let region = unsafe {
            RegionView::new(
                map.as_ptr() as *mut u8,
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
            region,
            full_rx,
            empty_tx: Some(empty_tx),
            finished: false,
            _map: map,
        })
    }

    /// Block for the next full-slot announcement, without acknowledging.
    ///
    /// Exposed separately from [`drain_next`](Self::drain_next) so tests
    /// (and consumers that post-process in place) can decouple observing a
    /// slot from releasing it back to the producer.
    pub fn recv_full(&mut self) -> io::Result<Option<u32>> {
        self.full_rx.recv()
    }

    /// Copy the records out of `slot` (trusting its `used` counter).
    pub fn read_slot(&self, slot: usize) -> Vec<EventRecord> {
        let used = self.region.used(slot) as usize;
        // SAFETY: the producer announced this slot and will not touch it
        // again until we acknowledge it.
        unsafe { self.region.records(slot, used) }.to_vec()
    }

    /// Return `slot` to the producer for reuse.
    pub fn ack(&mut self, slot: usize) -> io::Result<()> {
        let tx = self
            .empty_tx
            .as_mut()
            .expect("acknowledge after finish");
        tx.send(slot as u32)
    }

    /// Drain one notification: block, copy, acknowledge.
    pub fn drain_next(&mut self) -> io::Result<Drained> {
        match self.recv_full()? {
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "producer closed full queue without the finish sentinel",
            )),
            Some(FINISHED) => {
                let last_slot = match self.full_rx.recv()? {
                    Some(idx) => idx as usize,
                    None => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "finish sentinel not followed by the last slot index",
                        ))
                    }
                };
                self.finished = true;
                // Closing our empty-queue end is the acknowledgement the
                // producer's handshake blocks on.
                self.empty_tx = None;
                tracing::debug!(channel = self.index, last_slot, "producer finished");
                Ok(Drained::Finished { last_slot })
            }
            Some(slot) => {
                let slot = slot as usize;
                let events = self.read_slot(slot);
                self.ack(slot)?;
                Ok(Drained::Events(events))
            }
        }
    }

    /// Drain until the producer finishes, returning the whole stream in
    /// arrival order.
    pub fn drain_all(&mut self) -> io::Result<Vec<EventRecord>> {
        let mut all = Vec::new();
        loop {
            match self.drain_next()? {
                Drained::Events(mut events) => all.append(&mut events),
                Drained::Finished { .. } => return Ok(all),
            }
        }
    }

    /// Whether the termination sentinel has been observed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Split a drained stream back into per-thread record sequences using the
/// swap markers, dropping the markers themselves.
///
/// This is the demultiplexing step consumers perform; tests use it to
/// check record conservation and per-thread ordering.
pub fn demux(stream: &[EventRecord]) -> std::collections::BTreeMap<u64, Vec<EventRecord>> {
    let mut by_thread: std::collections::BTreeMap<u64, Vec<EventRecord>> =
        std::collections::BTreeMap::new();
    let mut current: Option<u64> = None;
    for record in stream {
        if let EventRecord::Sync {
            kind: sluice_core::SyncKind::Swap,
            id0,
            ..
        } = record
        {
            current = Some(*id0);
            by_thread.entry(*id0).or_default();
            continue;
        }
        let thread = current.expect("stream began without a thread-swap marker");
        by_thread.entry(thread).or_default().push(*record);
    }
    by_thread
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::SyncKind;

    #[test]
    fn demux_attributes_records_to_the_last_marker() {
        let stream = vec![
            EventRecord::swap_marker(1),
            EventRecord::instr(10),
            EventRecord::instr(11),
            EventRecord::swap_marker(2),
            EventRecord::instr(20),
            EventRecord::swap_marker(1),
            EventRecord::instr(12),
        ];
        let by_thread = demux(&stream);
        assert_eq!(
            by_thread[&1],
            vec![
                EventRecord::instr(10),
                EventRecord::instr(11),
                EventRecord::instr(12)
            ]
        );
        assert_eq!(by_thread[&2], vec![EventRecord::instr(20)]);
    }

    #[test]
    fn demux_keeps_non_swap_sync_records() {
        let stream = vec![
            EventRecord::swap_marker(3),
            EventRecord::Sync {
                kind: SyncKind::Barrier,
                id0: 0xb,
                id1: 0,
            },
        ];
        let by_thread = demux(&stream);
        assert_eq!(by_thread[&3].len(), 1);
    }

    #[test]
    #[should_panic(expected = "without a thread-swap marker")]
    fn demux_rejects_unattributed_records() {
        demux(&[EventRecord::instr(1)]);
    }
}
