use std::fs;
use std::path::Path;

use axi_agents::{BackingStore, LogicValue};
use tracing::debug;

use crate::UtilError;

const MAX_VALUE_BYTES: usize = std::mem::size_of::<LogicValue>();

/// File contents addressed by byte offset.
///
/// Integers can be read in the file's byte order or reversed, and the whole
/// image can be copied into a memory slave's backing store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileImage {
    bytes: Vec<u8>,
}

impl FileImage {
    /// Loads the whole file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`UtilError::Io`] when the file cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, UtilError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| UtilError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "file image loaded");
        Ok(Self { bytes })
    }

    /// Wraps bytes already in memory.
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for an empty file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the raw contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn slice(&self, addr: usize, size: usize) -> Result<&[u8], UtilError> {
        if size > MAX_VALUE_BYTES {
            return Err(UtilError::WidthTooLarge { bytes: size });
        }
        addr.checked_add(size)
            .and_then(|end| self.bytes.get(addr..end))
            .ok_or(UtilError::OutOfBounds {
                addr,
                bytes: size,
                len: self.bytes.len(),
            })
    }

    /// Reads `size` bytes at `addr` as an integer in file order, the first
    /// byte being the most significant.
    ///
    /// # Errors
    ///
    /// Returns [`UtilError::OutOfBounds`] past the end of the file and
    /// [`UtilError::WidthTooLarge`] for more than 16 bytes.
    pub fn read(&self, addr: usize, size: usize) -> Result<LogicValue, UtilError> {
        Ok(self
            .slice(addr, size)?
            .iter()
            .fold(0, |acc, byte| (acc << 8) | LogicValue::from(*byte)))
    }

    /// Reads `size` bytes at `addr` as an integer in reversed byte order,
    /// the first byte being the least significant.
    ///
    /// # Errors
    ///
    /// Same as [`FileImage::read`].
    pub fn read_reverse_byte_order(&self, addr: usize, size: usize) -> Result<LogicValue, UtilError> {
        Ok(self
            .slice(addr, size)?
            .iter()
            .rev()
            .fold(0, |acc, byte| (acc << 8) | LogicValue::from(*byte)))
    }

    /// Copies the image into `store` starting at bus address `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`UtilError::Bus`] when the image does not fit; the store is
    /// left untouched.
    pub fn preload(&self, store: &mut BackingStore, addr: u64) -> Result<(), UtilError> {
        store.write(addr, &self.bytes)?;
        debug!(addr, bytes = self.bytes.len(), "image preloaded");
        Ok(())
    }
}
