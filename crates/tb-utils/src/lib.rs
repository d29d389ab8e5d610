//! Helpers shared by AXI testbenches: checksums, stream packet conversion,
//! network stimulus, reset agents and file-backed memory images.

/// Error type for the utility helpers.
pub mod error;
pub use error::UtilError;

/// CRC-16/XMODEM checksums.
pub mod crc;
pub use crc::{crc16, crc16_of_value};

/// Conversion between byte packets and AXI4-Stream frames.
pub mod packet;
pub use packet::{packet_to_stream, stream_to_packet};

/// Seeded random Ethernet, IP, TCP and UDP stimulus frames.
pub mod netgen;
pub use netgen::{Encapsulation, GeneratedPacket, PacketGenerator, Transport};

/// Toeplitz hashing as used for receive side scaling.
pub mod toeplitz;
pub use toeplitz::{toeplitz_hash, FlowTuple};

/// Value comparison and byte-order helpers.
pub mod check;
pub use check::{check_value, swap_byte_order};

/// Reset and toggle stimulus agents.
pub mod stimulus;
pub use stimulus::{ResetPolarity, ResetPulse, SignalToggler, RESET_CYCLES};

/// File contents addressed like a memory.
pub mod image;
pub use image::FileImage;

/// Decile progress logging for long runs.
pub mod progress;
pub use progress::ProgressReporter;

#[cfg(test)]
use tempfile as _;
