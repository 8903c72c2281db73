//! sluice-shm: the shared-memory event-streaming channel.
//!
//! An instrumented multi-threaded process (the producer) moves fixed-size
//! trace records to a separate consumer process through a fixed ring of
//! event buffers in shared memory, with flow control over two named FIFOs
//! per channel and a FIFO-fair ordering lock serializing producer threads.
//!
//! # Architecture
//!
//! ```text
//!  producer process                      consumer process
//!  ┌──────────────────────┐
//!  │ thread ── ThreadCursor ──┐
//!  │ thread ── ThreadCursor ──┤ TicketLock (FIFO-fair)
//!  │ thread ── ThreadCursor ──┘   │
//!  └───────────────│──────┘       ▼
//!          ┌───────────────────────────────┐
//!          │ shared region: ring of slots  │
//!          │  { used: u32, records: [..] } │──── drain ───▶ ChannelHost
//!          └───────────────────────────────┘
//!            │  full FIFO (slot index)  ──────────────────▶
//!            ◀────────────────  empty FIFO (slot index)  │
//! ```
//!
//! The hot path (`ThreadCursor::append`) is a bounds check and a raw write:
//! no lock, no allocation, no system call. Buffer rotation and the
//! producer/consumer handoff run under the per-channel [`TicketLock`] and
//! block — never spin — when the ring is exhausted. Backpressure from a
//! slow consumer stalls producers by design.
//!
//! Channel discovery is a deterministic naming convention under a shared
//! directory; the consumer creates the resources ([`ChannelHost::create`])
//! and the producer attaches ([`ChannelRegistry::connect`]) with bounded
//! retries.

mod channel;
mod cursor;
pub mod fifo;
pub mod layout;
mod registry;
mod ticket;

pub mod host;

pub use channel::Channel;
pub use cursor::ThreadCursor;
pub use fifo::{FifoKind, FINISHED};
pub use host::{demux, ChannelHost, Drained};
pub use layout::{region_size, RegionView, SLOT_HEADER_SIZE};
pub use registry::ChannelRegistry;
pub use ticket::TicketLock;
