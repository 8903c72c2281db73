//! In-memory models of the sluice handoff protocol for property testing.
//!
//! The models reimplement the slot state machine and the multi-thread
//! append/flush/drain flow in pure Rust, with every invariant checked
//! after every operation, so they can be fuzzed without touching real
//! shared memory or FIFOs.

pub mod handoff_model;
pub mod slot_model;
