//! Channel configuration shared out-of-band between producer and consumer.

use std::path::PathBuf;

use crate::SetupError;

/// Default number of ring slots per channel.
pub const DEFAULT_SLOTS_PER_CHANNEL: usize = 8;
/// Default number of event records per slot.
pub const DEFAULT_RECORDS_PER_SLOT: usize = 1024;

/// Configuration for a set of channels.
///
/// Both processes must be started with identical values; the region size
/// derived from `slots_per_channel` and `records_per_slot` is verified at
/// attach time, but the rest is trusted.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Rendezvous directory holding the shared-memory files and FIFOs.
    pub dir: PathBuf,
    /// Number of channels. Producer threads are routed to channel
    /// `thread_id % channels`.
    pub channels: usize,
    /// Ring size. Must be a power of two so index advancement is a mask.
    pub slots_per_channel: usize,
    /// Capacity of one slot, in records.
    pub records_per_slot: usize,
    /// When set, no consumer handshake is performed: each channel writes
    /// into a locally allocated region and recycles slots itself. Used for
    /// isolated testing of the producer side.
    pub standalone: bool,
}

impl ChannelConfig {
    /// A configuration with the default ring geometry.
    pub fn new(dir: impl Into<PathBuf>, channels: usize) -> Self {
        Self {
            dir: dir.into(),
            channels,
            slots_per_channel: DEFAULT_SLOTS_PER_CHANNEL,
            records_per_slot: DEFAULT_RECORDS_PER_SLOT,
            standalone: false,
        }
    }

    /// Validate the geometry. Called once at registry startup.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.channels == 0 {
            return Err(SetupError::Config("channel count must be non-zero".into()));
        }
        if !self.slots_per_channel.is_power_of_two() {
            return Err(SetupError::Config(format!(
                "slots_per_channel must be a power of two, got {}",
                self.slots_per_channel
            )));
        }
        if self.records_per_slot == 0 {
            return Err(SetupError::Config(
                "records_per_slot must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_valid() {
        ChannelConfig::new("/tmp/sluice", 2).validate().unwrap();
    }

    #[test]
    fn rejects_non_power_of_two_ring() {
        let mut cfg = ChannelConfig::new("/tmp/sluice", 1);
        cfg.slots_per_channel = 6;
        assert!(matches!(cfg.validate(), Err(SetupError::Config(_))));
    }

    #[test]
    fn rejects_zero_channels() {
        let cfg = ChannelConfig::new("/tmp/sluice", 0);
        assert!(matches!(cfg.validate(), Err(SetupError::Config(_))));
    }

    #[test]
    fn rejects_empty_slots() {
        let mut cfg = ChannelConfig::new("/tmp/sluice", 1);
        cfg.records_per_slot = 0;
        assert!(matches!(cfg.validate(), Err(SetupError::Config(_))));
    }
}
