use thiserror::Error;

use crate::{Channel, Response, SignalError};

/// Fault classes used for statistics aggregation and test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// The far side answered with an error response.
    Response,
    /// An access fell outside the backing store.
    Address,
    /// The request used an encoding the agent does not implement.
    Unsupported,
    /// A handshake rule was broken by the other side.
    Protocol,
}

/// Bus-level faults observed or raised by agents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BusFault {
    /// A transaction completed with `SLVERR` or `DECERR`.
    #[error("{channel} transaction at {addr:#x} answered {resp}")]
    BusError {
        /// Channel that carried the response.
        channel: Channel,
        /// Transaction address.
        addr: u64,
        /// Error response status.
        resp: Response,
    },
    /// An access touched bytes outside `[base, end)`.
    #[error("access of {bytes} bytes at {addr:#x} outside [{base:#x}, {end:#x})")]
    AddressRange {
        /// First byte address.
        addr: u64,
        /// Number of bytes touched.
        bytes: u64,
        /// Lowest valid address.
        base: u64,
        /// One past the highest valid address.
        end: u64,
    },
    /// `AxBURST` selected `WRAP` or the reserved encoding.
    #[error("unsupported burst encoding {encoding}")]
    UnsupportedBurst {
        /// Raw `AxBURST` value.
        encoding: u8,
    },
    /// `2^AxSIZE` exceeds the data bus width.
    #[error("beat of {size_bytes} bytes wider than {bus_bytes}-byte data bus")]
    UnsupportedBeatSize {
        /// Requested bytes per beat.
        size_bytes: usize,
        /// Data bus width in bytes.
        bus_bytes: usize,
    },
    /// The other side broke a handshake rule.
    #[error("protocol violation on {channel}: {detail}")]
    ProtocolViolation {
        /// Channel where the violation was sampled.
        channel: Channel,
        /// Human-readable description.
        detail: String,
    },
}

impl BusFault {
    /// Returns the response a slave signals for this fault.
    #[must_use]
    pub const fn response(&self) -> Response {
        match self {
            Self::BusError { resp, .. } => *resp,
            Self::AddressRange { .. } => Response::DecErr,
            Self::UnsupportedBurst { .. }
            | Self::UnsupportedBeatSize { .. }
            | Self::ProtocolViolation { .. } => Response::SlvErr,
        }
    }

    /// Returns the aggregation class for this fault.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::BusError { .. } => FaultClass::Response,
            Self::AddressRange { .. } => FaultClass::Address,
            Self::UnsupportedBurst { .. } | Self::UnsupportedBeatSize { .. } => {
                FaultClass::Unsupported
            }
            Self::ProtocolViolation { .. } => FaultClass::Protocol,
        }
    }
}

/// Errors surfaced by testbench operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TbError {
    /// Signal resolution or ownership failure.
    #[error(transparent)]
    Signal(#[from] SignalError),
    /// Bus fault raised by an agent.
    #[error(transparent)]
    Fault(#[from] BusFault),
    /// A transaction was started while another one is outstanding.
    #[error("agent `{agent}` already has an outstanding transaction")]
    Busy {
        /// Agent name.
        agent: String,
    },
    /// A result was requested before the transaction finished.
    #[error("agent `{agent}` has no completed transaction")]
    Incomplete {
        /// Agent name.
        agent: String,
    },
    /// The scheduler wait budget ran out.
    #[error("wait budget of {edges} edges exhausted")]
    Timeout {
        /// Edges spent waiting.
        edges: u64,
    },
}

impl TbError {
    /// Returns the bus fault carried by this error, if any.
    #[must_use]
    pub const fn fault(&self) -> Option<&BusFault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BusFault, FaultClass, TbError};
    use crate::{Channel, Response};

    #[test]
    fn response_mapping_matches_slave_behaviour() {
        let range = BusFault::AddressRange {
            addr: 0x20,
            bytes: 4,
            base: 0,
            end: 0x10,
        };
        assert_eq!(range.response(), Response::DecErr);
        assert_eq!(
            BusFault::UnsupportedBeatSize {
                size_bytes: 8,
                bus_bytes: 4,
            }
            .response(),
            Response::SlvErr
        );
        assert_eq!(
            BusFault::BusError {
                channel: Channel::WriteResponse,
                addr: 0x10,
                resp: Response::DecErr,
            }
            .response(),
            Response::DecErr
        );
    }

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(
            BusFault::UnsupportedBurst { encoding: 2 }.class(),
            FaultClass::Unsupported
        );
        assert_eq!(
            BusFault::ProtocolViolation {
                channel: Channel::Stream,
                detail: "tvalid dropped".to_string(),
            }
            .class(),
            FaultClass::Protocol
        );
    }

    #[test]
    fn messages_name_channel_and_status() {
        let fault = BusFault::BusError {
            channel: Channel::WriteResponse,
            addr: 0x10,
            resp: Response::SlvErr,
        };
        assert_eq!(fault.to_string(), "B transaction at 0x10 answered SLVERR");

        let err = TbError::from(fault.clone());
        assert_eq!(err.fault(), Some(&fault));
        assert!(TbError::Timeout { edges: 3 }.fault().is_none());
    }
}
