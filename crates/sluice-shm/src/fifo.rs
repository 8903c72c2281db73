//! Notification queues over named FIFOs.
//!
//! Each channel has two: `full` (producer → consumer, "this slot index is
//! ready to drain") and `empty` (consumer → producer, "this slot index has
//! been drained"). Items are native-endian `u32` slot indices; pipe writes
//! of that size are atomic, so indices never interleave. The consumer
//! creates both FIFOs plus the shared-memory file; the producer rendezvous
//! on deterministic names under a shared directory and waits with bounded
//! backoff for them to appear.
//!
//! On shutdown the producer writes the [`FINISHED`] sentinel followed by
//! the last active slot index; end-of-stream on a queue (all writers
//! closed) is surfaced as `None`.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sluice_core::SetupError;

/// Sentinel index announcing the end of the producer's stream.
pub const FINISHED: u32 = u32::MAX;

/// Interval between existence checks while waiting for the consumer.
const ATTACH_RETRY_INTERVAL: Duration = Duration::from_millis(100);
/// Number of existence checks before giving up on the consumer.
const ATTACH_RETRY_LIMIT: u32 = 50;

/// The per-channel rendezvous resources, named `{dir}/{base}-{index}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoKind {
    /// The shared-memory file (not a FIFO, but named the same way).
    Shmem,
    /// Producer → consumer slot announcements.
    Full,
    /// Consumer → producer drain acknowledgements.
    Empty,
}

impl FifoKind {
    fn base(self) -> &'static str {
        match self {
            FifoKind::Shmem => "shmem",
            FifoKind::Full => "full",
            FifoKind::Empty => "empty",
        }
    }
}

/// Deterministic path of a rendezvous resource.
pub fn resource_path(dir: &Path, kind: FifoKind, channel: usize) -> PathBuf {
    dir.join(format!("{}-{}", kind.base(), channel))
}

/// Create a FIFO at `path` (consumer side).
pub fn create_fifo(path: &Path) -> io::Result<()> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    // SAFETY: cpath is a valid NUL-terminated string.
    let rc = unsafe { libc::mkfifo(cpath.as_ptr(), 0o600) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Block until `path` exists, polling with bounded backoff.
///
/// The consumer creates the rendezvous resources asynchronously; if it
/// never shows up the producer must fail fatally rather than trace into
/// the void.
pub fn await_resource(path: &Path) -> Result<(), SetupError> {
    await_resource_with(path, ATTACH_RETRY_INTERVAL, ATTACH_RETRY_LIMIT)
}

fn await_resource_with(path: &Path, interval: Duration, limit: u32) -> Result<(), SetupError> {
    for _ in 0..limit {
        if path.exists() {
            return Ok(());
        }
        std::thread::sleep(interval);
    }
    Err(SetupError::Timeout {
        path: path.to_path_buf(),
    })
}

/// Sending half of a notification queue.
#[derive(Debug)]
pub struct IndexTx {
    file: File,
}

impl IndexTx {
    /// Open `path` for writing. Blocks until the other side opens the
    /// reading half.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).open(path)?;
        Ok(Self { file })
    }

    /// Send one slot index.
    pub fn send(&mut self, index: u32) -> io::Result<()> {
        self.file.write_all(&index.to_ne_bytes())
    }
}

/// Receiving half of a notification queue.
#[derive(Debug)]
pub struct IndexRx {
    file: File,
}

impl IndexRx {
    /// Open `path` for reading. Blocks until the other side opens the
    /// writing half.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self { file })
    }

    /// Receive one slot index, blocking until one arrives.
    ///
    /// Returns `None` at end-of-stream (every writer closed). A stream
    /// that ends in the middle of an index is a protocol error.
    pub fn recv(&mut self) -> io::Result<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "notification queue closed mid-index",
                ));
            }
            filled += n;
        }
        Ok(Some(u32::from_ne_bytes(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names_are_deterministic() {
        let dir = Path::new("/run/trace");
        assert_eq!(
            resource_path(dir, FifoKind::Shmem, 3),
            PathBuf::from("/run/trace/shmem-3")
        );
        assert_eq!(
            resource_path(dir, FifoKind::Full, 0),
            PathBuf::from("/run/trace/full-0")
        );
        assert_eq!(
            resource_path(dir, FifoKind::Empty, 12),
            PathBuf::from("/run/trace/empty-12")
        );
    }

    #[test]
    fn send_and_recv_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full-0");
        create_fifo(&path).unwrap();

        let reader = std::thread::spawn({
            let path = path.clone();
            move || {
                let mut rx = IndexRx::open(&path).unwrap();
                let mut seen = Vec::new();
                while let Some(idx) = rx.recv().unwrap() {
                    seen.push(idx);
                }
                seen
            }
        });

        let mut tx = IndexTx::open(&path).unwrap();
        for idx in [0u32, 3, 1, FINISHED] {
            tx.send(idx).unwrap();
        }
        drop(tx); // reader sees EOF

        assert_eq!(reader.join().unwrap(), vec![0, 3, 1, FINISHED]);
    }

    #[test]
    fn await_resource_times_out_on_absent_consumer() {
        let missing = Path::new("/nonexistent-sluice-dir/full-0");
        match await_resource_with(missing, Duration::from_millis(1), 3) {
            Err(SetupError::Timeout { path }) => assert_eq!(path, missing),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
