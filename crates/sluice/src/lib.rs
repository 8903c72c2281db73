//! sluice: cross-process trace-event streaming over shared-memory rings.
//!
//! An instrumented multi-threaded process appends fixed-size trace
//! records through a per-thread cursor; a separate consumer process
//! drains them from shared memory, paced by a full/empty notification
//! protocol. The hot path needs no lock, no allocation, and no system
//! call.
//!
//! # Producer side
//!
//! ```no_run
//! use sluice::prelude::*;
//!
//! let config = ChannelConfig::new("/run/trace-session", 2);
//! let registry = ChannelRegistry::connect(&config)?;
//!
//! // Per instrumented thread (id assigned in spawn order):
//! let mut cursor = registry.cursor(1);
//! cursor.append(EventRecord::instr(0x4000_1000));
//! cursor.append(EventRecord::Mem { kind: MemKind::Load, size: 8, addr: 0x7fff_0000 });
//! // Before blocking in application-level sync, hand the channel back:
//! cursor.force_flush();
//!
//! registry.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Consumer side
//!
//! The consumer creates the rendezvous resources first, one
//! [`ChannelHost`] per channel, then drains until the producer's
//! termination handshake:
//!
//! ```no_run
//! use sluice::{ChannelConfig, ChannelHost};
//!
//! let config = ChannelConfig::new("/run/trace-session", 2);
//! let mut host = ChannelHost::create(0, &config)?;
//! let stream = host.drain_all()?;
//! let per_thread = sluice::demux(&stream);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core types: the wire contract.
pub use sluice_core::{
    ChannelConfig, CompKind, ContextKind, EventRecord, MemKind, SetupError, SyncKind, RECORD_SIZE,
};

// Channel machinery.
pub use sluice_shm::{
    demux, Channel, ChannelHost, ChannelRegistry, Drained, ThreadCursor, FINISHED,
};

/// Prelude for producer-side embedders.
pub mod prelude {
    pub use crate::{
        ChannelConfig, ChannelRegistry, CompKind, EventRecord, MemKind, SyncKind, ThreadCursor,
    };
}
