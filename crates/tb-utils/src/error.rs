use std::io;
use std::path::PathBuf;

use axi_agents::{BusFault, SignalError};
use thiserror::Error;

/// Failures raised by the utility helpers.
#[derive(Debug, Error)]
pub enum UtilError {
    /// Compared values differ.
    #[error("incorrect value '{name}': {actual:#x} != {expected:#x}")]
    ValueMismatch {
        /// Name of the checked quantity.
        name: String,
        /// Observed value.
        actual: u128,
        /// Expected value.
        expected: u128,
    },
    /// A value does not fit the requested byte length.
    #[error("value {value:#x} does not fit in {bytes} bytes")]
    ValueTooWide {
        /// Offending value.
        value: u128,
        /// Byte length it had to fit.
        bytes: usize,
    },
    /// More bytes were requested than an integer can hold.
    #[error("cannot convert {bytes} bytes to an integer (at most 16)")]
    WidthTooLarge {
        /// Requested byte count.
        bytes: usize,
    },
    /// The stream data width is not a whole number of bytes in 8..=128 bits.
    #[error("unsupported stream data width of {bits} bits")]
    InvalidBusWidth {
        /// Requested width.
        bits: u32,
    },
    /// A final `TKEEP` is not a contiguous run of low lanes.
    #[error("final TKEEP {keep:#x} is not a contiguous low-lane mask")]
    InvalidKeep {
        /// Offending keep value.
        keep: u128,
    },
    /// The hash key is too short for the input.
    #[error("hash key of {key_bytes} bytes is too short for {input_bytes} input bytes")]
    KeyTooShort {
        /// Key length.
        key_bytes: usize,
        /// Input length.
        input_bytes: usize,
    },
    /// An image access falls outside the loaded contents.
    #[error("image access at {addr:#x}+{bytes} exceeds {len} bytes")]
    OutOfBounds {
        /// Start offset.
        addr: usize,
        /// Access size.
        bytes: usize,
        /// Image size.
        len: usize,
    },
    /// Reading an image file failed.
    #[error("cannot read `{}`", path.display())]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A bus-level fault from the agent crate.
    #[error(transparent)]
    Bus(#[from] BusFault),
    /// A signal could not be resolved or claimed.
    #[error(transparent)]
    Signal(#[from] SignalError),
}
