//! AXI4 wire encodings and validated transaction descriptors.

use std::fmt;

use crate::{BusFault, LogicValue};

/// Largest AXI4 burst in beats (`AxLEN = 255`).
pub const MAX_BURST_BEATS: u16 = 256;

/// Largest encodable `AxSIZE` field (128 bytes per beat).
pub const MAX_SIZE_ENCODING: u8 = 7;

/// AXI channel identifiers used in traces and fault reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Channel {
    /// Write address (`AW`).
    WriteAddress,
    /// Write data (`W`).
    WriteData,
    /// Write response (`B`).
    WriteResponse,
    /// Read address (`AR`).
    ReadAddress,
    /// Read data (`R`).
    ReadData,
    /// AXI4-Stream transfer (`T`).
    Stream,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WriteAddress => "AW",
            Self::WriteData => "W",
            Self::WriteResponse => "B",
            Self::ReadAddress => "AR",
            Self::ReadData => "R",
            Self::Stream => "T",
        };
        f.write_str(name)
    }
}

/// Transfer direction of a memory-mapped transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Direction {
    /// Data flows from slave to master.
    Read,
    /// Data flows from master to slave.
    Write,
}

impl Direction {
    /// Address channel that opens a transaction in this direction.
    #[must_use]
    pub const fn address_channel(self) -> Channel {
        match self {
            Self::Read => Channel::ReadAddress,
            Self::Write => Channel::WriteAddress,
        }
    }
}

/// Two-bit `xRESP` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Response {
    /// Normal access success.
    #[default]
    Okay = 0,
    /// Exclusive access success.
    ExOkay = 1,
    /// Slave error.
    SlvErr = 2,
    /// Decode error, no slave at the address.
    DecErr = 3,
}

impl Response {
    /// Decodes the low two bits of a sampled response signal.
    #[must_use]
    pub const fn from_bits(bits: LogicValue) -> Self {
        match bits & 0b11 {
            0 => Self::Okay,
            1 => Self::ExOkay,
            2 => Self::SlvErr,
            _ => Self::DecErr,
        }
    }

    /// Returns the wire encoding.
    #[must_use]
    pub const fn bits(self) -> LogicValue {
        self as LogicValue
    }

    /// `SLVERR` and `DECERR` are failures; `OKAY` and `EXOKAY` are not.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::SlvErr | Self::DecErr)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Okay => "OKAY",
            Self::ExOkay => "EXOKAY",
            Self::SlvErr => "SLVERR",
            Self::DecErr => "DECERR",
        };
        f.write_str(name)
    }
}

/// Supported `AxBURST` addressing kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum BurstKind {
    /// Every beat targets the start address.
    Fixed = 0,
    /// Each beat advances the address by the beat size.
    #[default]
    Incr = 1,
}

impl BurstKind {
    /// Decodes an `AxBURST` field.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::UnsupportedBurst`] for `WRAP` and the reserved
    /// encoding.
    pub fn decode(bits: LogicValue) -> Result<Self, BusFault> {
        match bits {
            0 => Ok(Self::Fixed),
            1 => Ok(Self::Incr),
            other => Err(BusFault::UnsupportedBurst {
                encoding: u8::try_from(other & 0xFF).unwrap_or(u8::MAX),
            }),
        }
    }

    /// Returns the wire encoding.
    #[must_use]
    pub const fn bits(self) -> LogicValue {
        self as LogicValue
    }
}

/// Validated address-phase request of a memory-mapped burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BurstRequest {
    /// Start address.
    pub addr: u64,
    /// Number of beats (`AxLEN + 1`).
    pub beats: u16,
    /// Bytes per beat (`2^AxSIZE`).
    pub beat_bytes: usize,
    /// Addressing kind.
    pub kind: BurstKind,
    /// Transfer direction.
    pub direction: Direction,
}

impl BurstRequest {
    /// Builds a request from raw `AxADDR`, `AxLEN`, `AxSIZE` and `AxBURST`
    /// fields.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::UnsupportedBurst`] for burst kinds other than
    /// `FIXED`/`INCR` and [`BusFault::ProtocolViolation`] for length or size
    /// fields outside the AXI4 encoding range.
    pub fn from_fields(
        direction: Direction,
        addr: LogicValue,
        len: LogicValue,
        size: LogicValue,
        burst: LogicValue,
    ) -> Result<Self, BusFault> {
        let kind = BurstKind::decode(burst)?;
        let channel = direction.address_channel();

        let beats = u16::try_from(len)
            .ok()
            .and_then(|len| len.checked_add(1))
            .filter(|beats| *beats <= MAX_BURST_BEATS)
            .ok_or_else(|| BusFault::ProtocolViolation {
                channel,
                detail: format!("burst length field {len} exceeds 255"),
            })?;

        let size = u8::try_from(size)
            .ok()
            .filter(|size| *size <= MAX_SIZE_ENCODING)
            .ok_or_else(|| BusFault::ProtocolViolation {
                channel,
                detail: format!("burst size field {size} exceeds {MAX_SIZE_ENCODING}"),
            })?;

        let addr = u64::try_from(addr).map_err(|_| BusFault::ProtocolViolation {
            channel,
            detail: format!("address {addr:#x} wider than 64 bits"),
        })?;

        Ok(Self {
            addr,
            beats,
            beat_bytes: 1 << size,
            kind,
            direction,
        })
    }

    /// Length of the `[addr, addr + beats * beat_bytes)` window the burst
    /// is validated against, for either burst kind.
    #[must_use]
    pub fn span_bytes(&self) -> u64 {
        self.beat_bytes as u64 * u64::from(self.beats)
    }

    /// Address of the beat at `index`.
    #[must_use]
    pub fn beat_addr(&self, index: u16) -> u64 {
        match self.kind {
            BurstKind::Fixed => self.addr,
            BurstKind::Incr => self
                .addr
                .wrapping_add(self.beat_bytes as u64 * u64::from(index)),
        }
    }
}

/// Single-beat AXI4-Lite write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LiteWrite {
    /// Target address.
    pub addr: u64,
    /// Write data.
    pub data: LogicValue,
    /// Byte-lane strobe; `None` enables every lane.
    pub strobe: Option<LogicValue>,
}

impl LiteWrite {
    /// Creates a full-width write.
    #[must_use]
    pub const fn new(addr: u64, data: LogicValue) -> Self {
        Self {
            addr,
            data,
            strobe: None,
        }
    }

    /// Restricts the write to the lanes set in `strobe`.
    #[must_use]
    pub const fn with_strobe(mut self, strobe: LogicValue) -> Self {
        self.strobe = Some(strobe);
        self
    }
}

/// Single-beat AXI4-Lite read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LiteRead {
    /// Target address.
    pub addr: u64,
}
