//! Model of one channel's ring and per-slot state machine.
//!
//! Tracks the `Reusable → Writable → Full → Reusable` cycle for every
//! slot, a single producer appending sequence-numbered records, and a
//! consumer acknowledging announced slots in arrival order. Invariants are
//! verified after every operation.

use std::collections::VecDeque;

/// Ring sizes used by the fuzz harness (powers of two only).
pub const MIN_SLOTS: usize = 2;
pub const MAX_SLOTS: usize = 16;
/// Slot capacities used by the fuzz harness.
pub const MIN_CAPACITY: usize = 1;
pub const MAX_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Writable,
    Full,
    Reusable,
}

/// Outcome of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    /// The ring is exhausted; a real producer would park on the empty
    /// queue here.
    WouldBlock,
}

pub struct RingModel {
    states: Vec<SlotState>,
    /// Record sequence numbers currently sitting in each slot.
    contents: Vec<Vec<u64>>,
    active: usize,
    capacity: usize,
    /// Announced slots the consumer has not acknowledged, in order.
    pending: VecDeque<usize>,
    /// Next record sequence number.
    next_seq: u64,
    /// Everything the consumer has drained, in drain order.
    pub drained: Vec<u64>,
    /// Number of full announcements made.
    pub announcements: usize,
}

impl RingModel {
    pub fn new(slots: usize, capacity: usize) -> Self {
        assert!(slots.is_power_of_two(), "ring size must be a power of two");
        assert!(capacity >= 1);
        Self {
            states: vec![SlotState::Reusable; slots],
            contents: vec![Vec::new(); slots],
            active: 0,
            capacity,
            pending: VecDeque::new(),
            next_seq: 0,
            drained: Vec::new(),
            announcements: 0,
        }
    }

    fn announce_active(&mut self) {
        assert_eq!(self.states[self.active], SlotState::Writable);
        self.states[self.active] = SlotState::Full;
        self.pending.push_back(self.active);
        self.announcements += 1;
        self.active = (self.active + 1) & (self.states.len() - 1);
    }

    /// Append one record, rotating the ring if the active slot is full.
    pub fn append(&mut self) -> AppendOutcome {
        if self.states[self.active] == SlotState::Writable
            && self.contents[self.active].len() == self.capacity
        {
            self.announce_active();
        }
        if self.states[self.active] != SlotState::Reusable
            && self.states[self.active] != SlotState::Writable
        {
            // Rotation target still owned by the consumer.
            return AppendOutcome::WouldBlock;
        }
        if self.states[self.active] == SlotState::Reusable {
            self.states[self.active] = SlotState::Writable;
            self.contents[self.active].clear();
        }
        self.contents[self.active].push(self.next_seq);
        self.next_seq += 1;
        AppendOutcome::Written
    }

    /// Forced flush: announce a non-empty active slot, never an empty one.
    pub fn flush(&mut self) {
        if self.states[self.active] == SlotState::Writable
            && !self.contents[self.active].is_empty()
        {
            self.announce_active();
        }
    }

    /// Consumer acknowledges the oldest announced slot, if any.
    pub fn ack(&mut self) -> bool {
        match self.pending.pop_front() {
            Some(slot) => {
                assert_eq!(
                    self.states[slot],
                    SlotState::Full,
                    "consumer acked a slot it was never handed"
                );
                self.drained.extend(self.contents[slot].iter().copied());
                self.contents[slot].clear();
                self.states[slot] = SlotState::Reusable;
                true
            }
            None => false,
        }
    }

    /// Drain whatever is left (flush + ack until idle), as shutdown does.
    pub fn drain_remaining(&mut self) {
        self.flush();
        while self.ack() {}
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        let writable = self
            .states
            .iter()
            .filter(|s| **s == SlotState::Writable)
            .count();
        if writable > 1 {
            return Err(format!("{writable} slots writable at once"));
        }
        for (slot, content) in self.contents.iter().enumerate() {
            if content.len() > self.capacity {
                return Err(format!("slot {slot} over capacity"));
            }
            if self.states[slot] == SlotState::Full && content.is_empty() {
                return Err(format!("slot {slot} announced while empty"));
            }
        }
        for slot in &self.pending {
            if self.states[*slot] != SlotState::Full {
                return Err(format!("pending slot {slot} is not Full"));
            }
        }
        let pending_set: std::collections::BTreeSet<_> = self.pending.iter().collect();
        if pending_set.len() != self.pending.len() {
            return Err("slot announced twice without an ack".into());
        }
        // Drained records are a prefix of the append sequence: nothing
        // lost, duplicated, or reordered.
        for (i, seq) in self.drained.iter().enumerate() {
            if *seq != i as u64 {
                return Err(format!("drain order broken at {i}: got {seq}"));
            }
        }
        Ok(())
    }
}

/// Operations the fuzzer drives.
#[derive(Debug, Clone, Copy)]
pub enum RingOp {
    Append,
    Flush,
    Ack,
}

/// Run `ops`, verifying invariants after each one, then drain and check
/// total conservation.
pub fn execute_and_verify(slots: usize, capacity: usize, ops: &[RingOp]) -> Result<(), String> {
    let mut model = RingModel::new(slots, capacity);
    for (i, op) in ops.iter().enumerate() {
        match op {
            RingOp::Append => {
                let outcome = model.append();
                if outcome == AppendOutcome::WouldBlock && model.pending.is_empty() {
                    return Err(format!(
                        "op {i}: producer blocked with nothing outstanding (deadlock)"
                    ));
                }
            }
            RingOp::Flush => model.flush(),
            RingOp::Ack => {
                model.ack();
            }
        }
        model
            .check_invariants()
            .map_err(|e| format!("after op {i} ({op:?}): {e}"))?;
    }

    let appended = model.next_seq;
    model.drain_remaining();
    model.check_invariants().map_err(|e| format!("after drain: {e}"))?;
    if model.drained.len() as u64 != appended {
        return Err(format!(
            "conservation broken: appended {appended}, drained {}",
            model.drained.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_and_rotates() {
        let mut model = RingModel::new(4, 2);
        for _ in 0..6 {
            assert_eq!(model.append(), AppendOutcome::Written);
        }
        // Slots 0 and 1 announced on rotation.
        assert_eq!(model.announcements, 2);
        model.check_invariants().unwrap();
    }

    #[test]
    fn blocks_when_ring_exhausted_and_resumes_on_ack() {
        let mut model = RingModel::new(2, 1);
        assert_eq!(model.append(), AppendOutcome::Written);
        assert_eq!(model.append(), AppendOutcome::Written);
        // Third append needs slot 0 back.
        assert_eq!(model.append(), AppendOutcome::WouldBlock);
        assert!(model.ack());
        assert_eq!(model.append(), AppendOutcome::Written);
        model.check_invariants().unwrap();
    }

    #[test]
    fn flush_on_empty_slot_announces_nothing() {
        let mut model = RingModel::new(4, 4);
        model.flush();
        assert_eq!(model.announcements, 0);
        model.append();
        model.flush();
        assert_eq!(model.announcements, 1);
        // Flushing again with nothing new stays quiet.
        model.flush();
        assert_eq!(model.announcements, 1);
    }

    #[test]
    fn conservation_over_mixed_ops() {
        let ops: Vec<RingOp> = (0..200)
            .map(|i| match i % 5 {
                0 | 1 | 2 => RingOp::Append,
                3 => RingOp::Flush,
                _ => RingOp::Ack,
            })
            .collect();
        execute_and_verify(4, 3, &ops).unwrap();
    }
}
