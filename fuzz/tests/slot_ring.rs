//! Bolero fuzzer for the ring slot state machine.
//!
//! Properties tested:
//! - At most one slot is writable at any time
//! - A slot is never announced while empty, or twice without an ack
//! - An exhausted ring blocks only while an announcement is outstanding
//! - Drained records form an exact prefix of the append sequence
//! - Full drain conserves every appended record

use bolero::check;
use sluice_fuzz::slot_model::{
    execute_and_verify, RingOp, MAX_CAPACITY, MAX_SLOTS, MIN_CAPACITY, MIN_SLOTS,
};

fn main() {
    check!()
        .with_type::<(u8, u8, Vec<u8>)>()
        .for_each(|(slots_byte, capacity_byte, ops_data)| {
            let slots = ((*slots_byte as usize % MAX_SLOTS) + MIN_SLOTS)
                .next_power_of_two()
                .min(MAX_SLOTS);
            let capacity =
                (*capacity_byte as usize % (MAX_CAPACITY - MIN_CAPACITY + 1)) + MIN_CAPACITY;

            let ops: Vec<RingOp> = ops_data
                .iter()
                .map(|b| match b % 4 {
                    0 | 1 => RingOp::Append,
                    2 => RingOp::Flush,
                    _ => RingOp::Ack,
                })
                .collect();

            if let Err(e) = execute_and_verify(slots, capacity, &ops) {
                panic!("invariant violated: {e}");
            }
        });
}

#[cfg(test)]
mod tests {
    use sluice_fuzz::slot_model::{execute_and_verify, RingOp};

    #[test]
    fn fuzz_ring_smoke() {
        let ops = vec![
            RingOp::Append,
            RingOp::Append,
            RingOp::Flush,
            RingOp::Ack,
            RingOp::Append,
            RingOp::Ack,
            RingOp::Ack,
        ];
        execute_and_verify(4, 2, &ops).unwrap();
    }

    #[test]
    fn fuzz_ring_minimal_geometry() {
        let ops = vec![RingOp::Append; 40];
        execute_and_verify(2, 1, &ops).unwrap();
    }
}
