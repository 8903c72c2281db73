//! The bounded set of channels a producer process connects at startup.
//!
//! An explicitly owned value — no global channel table. The embedder
//! creates one registry after parsing its configuration, hands clones of
//! the `Arc`ed channels to whoever needs them (via cursors), and calls
//! `shutdown` once at process exit.

use std::io;
use std::sync::Arc;

use sluice_core::{ChannelConfig, SetupError};

use crate::channel::Channel;
use crate::cursor::ThreadCursor;

/// All channels of one producer process.
pub struct ChannelRegistry {
    channels: Vec<Arc<Channel>>,
}

impl ChannelRegistry {
    /// Validate `config` and attach every channel.
    ///
    /// Fails fatally (to the caller) if the consumer's resources never
    /// appear or any region mismatches the configured geometry; a trace
    /// with a missing channel is not trustworthy.
    pub fn connect(config: &ChannelConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let mut channels = Vec::with_capacity(config.channels);
        for index in 0..config.channels {
            channels.push(Arc::new(Channel::open(index, config)?));
        }
        tracing::info!(
            channels = config.channels,
            slots = config.slots_per_channel,
            records = config.records_per_slot,
            standalone = config.standalone,
            "channel registry connected"
        );
        Ok(Self { channels })
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// The channel serving `thread_id`.
    ///
    /// Threads are spread over channels by id to reduce contention; all
    /// threads that hash to the same channel contend on its ordering lock.
    pub fn channel_for(&self, thread_id: u64) -> &Arc<Channel> {
        &self.channels[(thread_id % self.channels.len() as u64) as usize]
    }

    /// Build the write cursor for a producer thread.
    pub fn cursor(&self, thread_id: u64) -> ThreadCursor {
        ThreadCursor::new(Arc::clone(self.channel_for(thread_id)), thread_id)
    }

    /// Run the termination handshake on every channel.
    ///
    /// Returns after each consumer has acknowledged end-of-stream; only
    /// then may the process release its side of the shared resources.
    pub fn shutdown(&self) -> io::Result<()> {
        for channel in &self.channels {
            channel.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standalone(channels: usize) -> ChannelRegistry {
        let mut cfg = ChannelConfig::new("/unused", channels);
        cfg.slots_per_channel = 4;
        cfg.records_per_slot = 8;
        cfg.standalone = true;
        ChannelRegistry::connect(&cfg).unwrap()
    }

    #[test]
    fn threads_are_routed_by_modulo() {
        let registry = standalone(3);
        assert_eq!(registry.channel_for(0).index(), 0);
        assert_eq!(registry.channel_for(4).index(), 1);
        assert_eq!(registry.channel_for(5).index(), 2);
        assert_eq!(registry.channel_for(6).index(), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = ChannelConfig::new("/unused", 0);
        cfg.standalone = true;
        assert!(ChannelRegistry::connect(&cfg).is_err());
    }

    #[test]
    fn standalone_shutdown_completes() {
        let registry = standalone(2);
        let mut cursor = registry.cursor(7);
        cursor.append(sluice_core::EventRecord::instr(1));
        drop(cursor);
        registry.shutdown().unwrap();
    }
}
