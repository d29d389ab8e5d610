//! Simplified AXI4 memory slave.
//!
//! One burst is served at a time. Reads take priority over writes when both
//! address channels are valid on the same edge. Only `FIXED` and `INCR`
//! bursts are supported.

mod slave;
mod store;

pub use slave::MemorySlave;
pub use store::BackingStore;

use crate::PortNames;

/// Signal prefix used when no instance name is given.
pub const DEFAULT_MEMORY_PREFIX: &str = "m_axi";

/// Default backing store size.
pub const DEFAULT_MEMORY_BYTES: usize = 64 * 1024;

/// Random cycle delays inserted by the slave.
///
/// Every delay is drawn uniformly from `0..=max` (stalls from `1..=max`)
/// using a seeded generator, so runs are reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LatencyProfile {
    /// Upper bound of the delay before `AxREADY` and again before the first
    /// data beat.
    pub address_delay_max: u32,
    /// Upper bound of the idle gap between read beats.
    pub beat_gap_max: u32,
    /// Chance in percent of dropping `WREADY` after a write beat.
    pub write_stall_percent: u8,
    /// Upper bound of a `WREADY` stall.
    pub write_stall_max: u32,
    /// Generator seed.
    pub seed: u64,
}

impl LatencyProfile {
    /// The delays of the reference memory model: up to 10 cycles around the
    /// address phase, up to 5 between read beats, and 10% `WREADY` stalls of
    /// up to 5 cycles.
    #[must_use]
    pub const fn jittered(seed: u64) -> Self {
        Self {
            address_delay_max: 10,
            beat_gap_max: 5,
            write_stall_percent: 10,
            write_stall_max: 5,
            seed,
        }
    }

    /// Returns `true` when every delay is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.address_delay_max == 0
            && self.beat_gap_max == 0
            && (self.write_stall_percent == 0 || self.write_stall_max == 0)
    }
}

/// Memory slave settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemorySlaveConfig {
    /// Signal prefix, e.g. `m_axi` or `m_axi_dma`.
    pub prefix: String,
    /// Lowest mapped address.
    pub base: u64,
    /// Backing store size in bytes.
    pub size: usize,
    /// Delay profile.
    pub latency: LatencyProfile,
    /// Serve the write channels; when disabled no write signal is resolved.
    pub enable_writes: bool,
}

impl Default for MemorySlaveConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_MEMORY_PREFIX.to_string(),
            base: 0,
            size: DEFAULT_MEMORY_BYTES,
            latency: LatencyProfile::default(),
            enable_writes: true,
        }
    }
}

impl MemorySlaveConfig {
    /// Connects to `m_axi_<instance>_*` signals.
    #[must_use]
    pub fn for_instance(instance: &str) -> Self {
        Self {
            prefix: PortNames::with_instance(DEFAULT_MEMORY_PREFIX, Some(instance))
                .prefix()
                .to_string(),
            ..Self::default()
        }
    }

    /// Maps `size` bytes at `base`.
    #[must_use]
    pub const fn with_region(mut self, base: u64, size: usize) -> Self {
        self.base = base;
        self.size = size;
        self
    }

    /// Sets the delay profile.
    #[must_use]
    pub const fn with_latency(mut self, latency: LatencyProfile) -> Self {
        self.latency = latency;
        self
    }

    /// Serves reads only.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.enable_writes = false;
        self
    }

    pub(crate) fn ports(&self) -> PortNames {
        PortNames::new(self.prefix.as_str())
    }
}

/// Counters kept by the slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SlaveStats {
    /// Read bursts whose last beat was accepted.
    pub reads_completed: u64,
    /// Write bursts whose response was accepted.
    pub writes_completed: u64,
    /// Read beats transferred.
    pub read_beats: u64,
    /// Write beats transferred.
    pub write_beats: u64,
    /// Bursts answered with `SLVERR` or `DECERR`.
    pub error_responses: u64,
    /// Entries added to the fault log.
    pub faults: u64,
}

#[cfg(test)]
mod tests {
    use super::{LatencyProfile, MemorySlaveConfig};

    #[test]
    fn default_profile_has_no_delays() {
        assert!(LatencyProfile::default().is_zero());
        assert!(!LatencyProfile::jittered(7).is_zero());
    }

    #[test]
    fn instance_prefix_follows_naming_convention() {
        let config = MemorySlaveConfig::for_instance("dma").with_region(0x1000, 256);
        assert_eq!(config.prefix, "m_axi_dma");
        assert_eq!(config.base, 0x1000);
        assert_eq!(config.size, 256);
        assert!(config.enable_writes);
    }
}
