//! AXI4-Stream frame transactors.
//!
//! The writer holds each word stable until the reader accepts it. The reader
//! applies a configurable `TREADY` policy and checks that the writer honours
//! back-pressure.

mod frame;
mod reader;
mod writer;

pub use frame::StreamFrame;
pub use reader::{FrameCapture, ReadyPolicy, StreamReader};
pub use writer::{StreamWriter, StreamWriterConfig};

use crate::PortNames;

/// Prefix of a stream the testbench writes into (the DUT's slave port).
pub const DEFAULT_WRITER_PREFIX: &str = "s_axis";

/// Prefix of a stream the testbench reads from (the DUT's master port).
pub const DEFAULT_READER_PREFIX: &str = "m_axis";

/// Signal naming for one stream interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StreamConfig {
    /// Signal prefix, e.g. `s_axis` or `m_axis_rx`.
    pub prefix: String,
}

impl StreamConfig {
    /// Connects to `<prefix>_t*` signals.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Default naming for a writer, optionally suffixed with an instance.
    #[must_use]
    pub fn writer(instance: Option<&str>) -> Self {
        Self::with_prefix(PortNames::with_instance(DEFAULT_WRITER_PREFIX, instance).prefix())
    }

    /// Default naming for a reader, optionally suffixed with an instance.
    #[must_use]
    pub fn reader(instance: Option<&str>) -> Self {
        Self::with_prefix(PortNames::with_instance(DEFAULT_READER_PREFIX, instance).prefix())
    }

    pub(crate) fn ports(&self) -> PortNames {
        PortNames::new(self.prefix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::StreamConfig;

    #[test]
    fn default_prefixes_match_port_direction() {
        assert_eq!(StreamConfig::writer(None).prefix, "s_axis");
        assert_eq!(StreamConfig::reader(Some("rx")).prefix, "m_axis_rx");
    }
}
