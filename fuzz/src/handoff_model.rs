//! Model of the multi-thread append/flush/drain flow with swap markers.
//!
//! Several logical producer threads share one modeled channel. Operations
//! are already serialized (the fuzzer drives one at a time), which is
//! exactly what the ordering lock guarantees in the real implementation;
//! what this model checks is the *attribution* machinery layered on top:
//! a swap marker precedes a thread's records whenever the writer identity
//! changed, and demultiplexing the drained stream recovers every thread's
//! records in emission order.

use std::collections::VecDeque;

pub const MAX_THREADS: usize = 4;

/// A record in the modeled stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRecord {
    /// Writer identity changed; subsequent records belong to this thread.
    Swap { thread: u8 },
    /// Payload record `seq` emitted by `thread`.
    Data { thread: u8, seq: u64 },
}

pub struct HandoffModel {
    slots: Vec<Vec<ModelRecord>>,
    reusable: Vec<bool>,
    active: usize,
    capacity: usize,
    pending: VecDeque<usize>,
    last_writer: Option<u8>,
    /// Per-thread count of emitted payload records.
    emitted: [u64; MAX_THREADS],
    /// The consumer's view, in drain order.
    pub stream: Vec<ModelRecord>,
}

impl HandoffModel {
    pub fn new(slots: usize, capacity: usize) -> Self {
        assert!(slots.is_power_of_two());
        // Room for a swap marker and at least one record per slot.
        assert!(capacity >= 2);
        Self {
            slots: vec![Vec::new(); slots],
            reusable: vec![true; slots],
            active: 0,
            capacity,
            pending: VecDeque::new(),
            last_writer: None,
            emitted: [0; MAX_THREADS],
            stream: Vec::new(),
        }
    }

    /// Push one cell, rotating first if the active slot is at capacity.
    /// Returns false when the rotation target is still unacked.
    fn push_cell(&mut self, record: ModelRecord) -> bool {
        if !self.reusable[self.active] {
            return false;
        }
        if self.slots[self.active].len() == self.capacity {
            self.announce_active();
            if !self.reusable[self.active] {
                return false;
            }
        }
        self.slots[self.active].push(record);
        true
    }

    fn announce_active(&mut self) {
        self.reusable[self.active] = false;
        self.pending.push_back(self.active);
        self.active = (self.active + 1) & (self.slots.len() - 1);
    }

    /// Thread `thread` appends its next record, marker included if the
    /// writer identity changed. Returns false if the ring is exhausted
    /// (real producer would block).
    pub fn append(&mut self, thread: u8) -> bool {
        let thread = thread % MAX_THREADS as u8;
        if self.last_writer != Some(thread) {
            if !self.push_cell(ModelRecord::Swap { thread }) {
                return false;
            }
            self.last_writer = Some(thread);
        }
        let seq = self.emitted[thread as usize];
        if !self.push_cell(ModelRecord::Data { thread, seq }) {
            return false;
        }
        self.emitted[thread as usize] += 1;
        true
    }

    /// Forced flush of a non-empty active slot.
    pub fn flush(&mut self) {
        if self.reusable[self.active] && !self.slots[self.active].is_empty() {
            self.announce_active();
        }
    }

    /// Consumer drains the oldest announced slot.
    pub fn ack(&mut self) -> bool {
        match self.pending.pop_front() {
            Some(slot) => {
                self.stream.append(&mut self.slots[slot]);
                self.reusable[slot] = true;
                true
            }
            None => false,
        }
    }

    pub fn drain_remaining(&mut self) {
        self.flush();
        while self.ack() {}
    }

    /// Demux the consumer stream and check per-thread conservation and
    /// ordering against what was emitted.
    pub fn verify_stream(&self) -> Result<(), String> {
        let mut current: Option<u8> = None;
        let mut seen = [0u64; MAX_THREADS];
        for (i, record) in self.stream.iter().enumerate() {
            match record {
                ModelRecord::Swap { thread } => {
                    if current == Some(*thread) {
                        return Err(format!("record {i}: redundant swap marker for {thread}"));
                    }
                    current = Some(*thread);
                }
                ModelRecord::Data { thread, seq } => {
                    if current != Some(*thread) {
                        return Err(format!(
                            "record {i}: thread {thread} data under marker {current:?}"
                        ));
                    }
                    if *seq != seen[*thread as usize] {
                        return Err(format!(
                            "record {i}: thread {thread} emitted seq {} but stream has {seq}",
                            seen[*thread as usize]
                        ));
                    }
                    seen[*thread as usize] += 1;
                }
            }
        }
        Ok(())
    }

    /// After a full drain, every emitted record must have arrived.
    pub fn verify_conservation(&self) -> Result<(), String> {
        let mut counts = [0u64; MAX_THREADS];
        for record in &self.stream {
            if let ModelRecord::Data { thread, .. } = record {
                counts[*thread as usize] += 1;
            }
        }
        if counts != self.emitted {
            return Err(format!(
                "conservation broken: emitted {:?}, drained {:?}",
                self.emitted, counts
            ));
        }
        Ok(())
    }

    fn outstanding(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Operations the fuzzer drives.
#[derive(Debug, Clone, Copy)]
pub enum HandoffOp {
    Append { thread: u8 },
    Flush,
    Ack,
}

pub fn execute_and_verify(
    slots: usize,
    capacity: usize,
    ops: &[HandoffOp],
) -> Result<(), String> {
    let mut model = HandoffModel::new(slots, capacity);
    for (i, op) in ops.iter().enumerate() {
        match op {
            HandoffOp::Append { thread } => {
                if !model.append(*thread) && !model.outstanding() {
                    return Err(format!("op {i}: blocked with no slot outstanding"));
                }
            }
            HandoffOp::Flush => model.flush(),
            HandoffOp::Ack => {
                model.ack();
            }
        }
        model
            .verify_stream()
            .map_err(|e| format!("after op {i} ({op:?}): {e}"))?;
    }
    model.drain_remaining();
    model.verify_stream().map_err(|e| format!("after drain: {e}"))?;
    model.verify_conservation()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_precede_writer_changes() {
        let mut model = HandoffModel::new(4, 4);
        assert!(model.append(0));
        assert!(model.append(0));
        assert!(model.append(1));
        model.drain_remaining();
        assert_eq!(
            model.stream,
            vec![
                ModelRecord::Swap { thread: 0 },
                ModelRecord::Data { thread: 0, seq: 0 },
                ModelRecord::Data { thread: 0, seq: 1 },
                ModelRecord::Swap { thread: 1 },
                ModelRecord::Data { thread: 1, seq: 0 },
            ]
        );
        model.verify_stream().unwrap();
        model.verify_conservation().unwrap();
    }

    #[test]
    fn alternating_writers_interleave_correctly() {
        let mut model = HandoffModel::new(4, 8);
        for i in 0..50 {
            assert!(model.append((i % 2) as u8));
            // Keep the consumer slightly behind.
            if i % 3 == 0 {
                model.ack();
            }
        }
        model.drain_remaining();
        model.verify_stream().unwrap();
        model.verify_conservation().unwrap();
    }

    #[test]
    fn exhausted_ring_reports_block_not_corruption() {
        let mut model = HandoffModel::new(2, 2);
        assert!(model.append(0)); // marker + data fill slot 0
        assert!(model.append(0)); // rotates, starts slot 1
        assert!(model.append(0)); // fills slot 1
        assert!(!model.append(0)); // both slots full, slot 0 unacked
        assert!(model.outstanding());
        model.drain_remaining();
        model.verify_conservation().unwrap();
    }
}
