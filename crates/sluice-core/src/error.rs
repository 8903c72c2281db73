//! Setup-time error taxonomy.
//!
//! Only channel establishment is fallible-and-reportable: a trace with a
//! missing or mis-sized channel is not trustworthy, so the embedder is
//! expected to abort on any of these. Steady-state protocol violations are
//! assertions, and a stalled consumer is backpressure, not an error.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while establishing a channel.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The consumer never created its side of the rendezvous resources
    /// within the bounded retry window.
    #[error("timed out waiting for consumer resource {path}")]
    Timeout { path: PathBuf },

    /// The shared-memory file does not match the configured geometry.
    #[error("shared region size mismatch: expected {expected} bytes, found {actual}")]
    Map { expected: usize, actual: usize },

    /// The configuration itself is unusable.
    #[error("invalid channel configuration: {0}")]
    Config(String),

    /// Resource open/create failure.
    #[error("channel setup i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
