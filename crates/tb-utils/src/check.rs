use tracing::warn;

use crate::UtilError;

const MAX_BYTES: usize = std::mem::size_of::<u128>();

/// Reverses the byte order of the low `bytes` bytes of `value`.
///
/// # Errors
///
/// Returns [`UtilError::WidthTooLarge`] for more than 16 bytes and
/// [`UtilError::ValueTooWide`] when `value` has bits above the requested
/// length.
pub fn swap_byte_order(value: u128, bytes: usize) -> Result<u128, UtilError> {
    if bytes > MAX_BYTES {
        return Err(UtilError::WidthTooLarge { bytes });
    }
    let le = value.to_le_bytes();
    if le[bytes..].iter().any(|byte| *byte != 0) {
        return Err(UtilError::ValueTooWide { value, bytes });
    }
    Ok(le[..bytes]
        .iter()
        .fold(0, |acc, byte| (acc << 8) | u128::from(*byte)))
}

/// Compares an observed value against its expectation.
///
/// # Errors
///
/// Returns [`UtilError::ValueMismatch`] naming the quantity when the values
/// differ.
pub fn check_value(name: &str, actual: u128, expected: u128) -> Result<(), UtilError> {
    if actual == expected {
        return Ok(());
    }
    warn!(name, %actual, %expected, "value mismatch");
    Err(UtilError::ValueMismatch {
        name: name.to_string(),
        actual,
        expected,
    })
}
