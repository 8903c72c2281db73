//! sluice-core: shared types for the sluice event-streaming channel.
//!
//! This crate defines the **wire contract** between the instrumented
//! (producer) process and the out-of-process consumer: the fixed-size
//! tagged event record that lives in shared memory, the channel
//! configuration both sides agree on out-of-band, and the setup-time
//! error taxonomy.
//!
//! Everything here is deliberately free of I/O; the shared-memory and
//! notification plumbing lives in `sluice-shm`.

mod config;
mod error;
mod event;

pub use config::ChannelConfig;
pub use error::SetupError;
pub use event::{
    CompKind, ContextKind, EventRecord, MemKind, SyncKind, RECORD_SIZE,
};
