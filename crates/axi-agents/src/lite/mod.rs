//! Single-beat AXI4-Lite register access.
//!
//! Both transactors drive the request signals as soon as an operation is
//! started, then advance one handshake per edge. Only one operation may be
//! outstanding per transactor.

mod reader;
mod writer;

pub use reader::LiteReader;
pub use writer::LiteWriter;

use crate::{LogicValue, PortNames, Response};

/// Signal prefix used when no instance name is given.
pub const DEFAULT_LITE_PREFIX: &str = "s_axi";

/// Connection settings shared by both transactors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LiteConfig {
    /// Signal prefix, e.g. `s_axi` or `s_axi_ctrl`.
    pub prefix: String,
}

impl Default for LiteConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_LITE_PREFIX.to_string(),
        }
    }
}

impl LiteConfig {
    /// Connects to `s_axi_<instance>_*` signals.
    #[must_use]
    pub fn for_instance(instance: &str) -> Self {
        Self::with_prefix(PortNames::with_instance(DEFAULT_LITE_PREFIX, Some(instance)).prefix())
    }

    /// Connects to `<prefix>_*` signals.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub(crate) fn ports(&self) -> PortNames {
        PortNames::new(self.prefix.as_str())
    }
}

/// Data and status returned by a completed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LiteReadResult {
    /// Sampled `RDATA`.
    pub data: LogicValue,
    /// Sampled `RRESP`, `OKAY` when the interface has none.
    pub resp: Response,
}

#[cfg(test)]
mod tests {
    use super::LiteConfig;

    #[test]
    fn instance_prefix_follows_naming_convention() {
        assert_eq!(LiteConfig::default().prefix, "s_axi");
        assert_eq!(LiteConfig::for_instance("ctrl").prefix, "s_axi_ctrl");
    }
}
