//! The fixed-size tagged event record shared by producer and consumer.
//!
//! Both processes map the same region and interpret it through this type,
//! so the layout is part of the protocol: `#[repr(C, u8)]` pins the tag to
//! the first byte and gives every variant the same C-defined payload
//! layout. The record size is a compile-time constant checked below;
//! changing any variant is a wire-format break.

/// Direction of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemKind {
    Load = 0,
    Store = 1,
}

/// Class of a compute operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompKind {
    /// Integer operation.
    Iop = 0,
    /// Floating-point operation.
    Flop = 1,
}

/// Class of a context event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextKind {
    /// One retired application instruction.
    Instr = 0,
}

/// Class of a synchronization event.
///
/// `Swap` is synthetic: the channel inserts it whenever the identity of
/// the writing thread changes, so the consumer can demultiplex the stream
/// without a per-record thread id. The remaining kinds mirror the thread
/// library entry points the instrumentation wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncKind {
    Swap = 0,
    Create = 1,
    Join = 2,
    Lock = 3,
    Unlock = 4,
    Barrier = 5,
    CondWait = 6,
    CondSignal = 7,
    SpinLock = 8,
    SpinUnlock = 9,
}

/// A single trace event.
///
/// Records are written once, in program order per thread, and never
/// mutated; their lifetime ends when the consumer drains the containing
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, u8)]
pub enum EventRecord {
    /// A memory access: direction, access size in bytes, virtual address.
    Mem { kind: MemKind, size: u16, addr: u64 },
    /// A compute operation.
    Comp { kind: CompKind },
    /// A context event carrying the program counter.
    Context { kind: ContextKind, pc: u64 },
    /// A synchronization event: kind plus two auxiliary identifiers
    /// (primitive address, peer thread id, ... depending on kind).
    Sync { kind: SyncKind, id0: u64, id1: u64 },
}

/// Size in bytes of one record in the shared region.
pub const RECORD_SIZE: usize = core::mem::size_of::<EventRecord>();

// The consumer indexes the record array with this constant; a drift here
// silently corrupts the stream for the other process.
const _: () = assert!(RECORD_SIZE == 32, "EventRecord wire size changed");

impl EventRecord {
    /// The synthetic thread-swap marker for `thread_id`.
    #[inline]
    pub fn swap_marker(thread_id: u64) -> Self {
        EventRecord::Sync {
            kind: SyncKind::Swap,
            id0: thread_id,
            id1: 0,
        }
    }

    /// A plain instruction context event.
    #[inline]
    pub fn instr(pc: u64) -> Self {
        EventRecord::Context {
            kind: ContextKind::Instr,
            pc,
        }
    }

    /// Whether this record is a thread-swap marker.
    #[inline]
    pub fn is_swap_marker(&self) -> bool {
        matches!(
            self,
            EventRecord::Sync {
                kind: SyncKind::Swap,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_first_byte() {
        let rec = EventRecord::Sync {
            kind: SyncKind::Barrier,
            id0: 7,
            id1: 8,
        };
        // repr(C, u8): discriminant occupies the first byte.
        let bytes: [u8; RECORD_SIZE] = unsafe { core::mem::transmute(rec) };
        assert_eq!(bytes[0], 3); // Sync is the fourth variant
    }

    #[test]
    fn swap_marker_roundtrip() {
        let rec = EventRecord::swap_marker(42);
        assert!(rec.is_swap_marker());
        match rec {
            EventRecord::Sync { kind, id0, id1 } => {
                assert_eq!(kind, SyncKind::Swap);
                assert_eq!(id0, 42);
                assert_eq!(id1, 0);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn non_sync_records_are_not_markers() {
        assert!(!EventRecord::instr(0x4000).is_swap_marker());
        assert!(!EventRecord::Comp { kind: CompKind::Flop }.is_swap_marker());
        assert!(!EventRecord::Mem {
            kind: MemKind::Load,
            size: 8,
            addr: 0xdead_beef
        }
        .is_swap_marker());
    }
}
