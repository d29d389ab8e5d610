use crate::{BusFault, LogicValue};

/// Widest integer the host-side accessors convert.
const MAX_VALUE_BYTES: usize = std::mem::size_of::<LogicValue>();

/// Byte array mapped at `[base, base + len)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BackingStore {
    bytes: Vec<u8>,
    base: u64,
}

impl BackingStore {
    /// Creates a zero-filled store of `size` bytes starting at `base`.
    #[must_use]
    pub fn new(size: usize, base: u64) -> Self {
        Self {
            bytes: vec![0; size],
            base,
        }
    }

    /// Lowest mapped address.
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// One past the highest mapped address.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.bytes.len() as u64)
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-sized store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the raw contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Validates `[addr, addr + bytes)` and returns its offset into the store.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::AddressRange`] when any byte is unmapped.
    pub fn check_range(&self, addr: u64, bytes: u64) -> Result<usize, BusFault> {
        let fault = || BusFault::AddressRange {
            addr,
            bytes,
            base: self.base,
            end: self.end(),
        };
        let offset = addr.checked_sub(self.base).ok_or_else(fault)?;
        let stop = offset.checked_add(bytes).ok_or_else(fault)?;
        if stop > self.bytes.len() as u64 {
            return Err(fault());
        }
        usize::try_from(offset).map_err(|_| fault())
    }

    /// Borrows `len` bytes at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::AddressRange`] when any byte is unmapped.
    pub fn read(&self, addr: u64, len: usize) -> Result<&[u8], BusFault> {
        let offset = self.check_range(addr, len as u64)?;
        Ok(&self.bytes[offset..offset + len])
    }

    /// Copies `data` to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::AddressRange`] when any byte is unmapped; the
    /// store is left untouched.
    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), BusFault> {
        let offset = self.check_range(addr, data.len() as u64)?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copies the bytes of `data` whose bit is set in `strobe` to `addr`,
    /// bit 0 selecting the byte at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::AddressRange`] when any byte of `data` is
    /// unmapped, whether or not it is strobed; nothing is written then.
    pub fn write_masked(
        &mut self,
        addr: u64,
        data: &[u8],
        strobe: LogicValue,
    ) -> Result<(), BusFault> {
        let offset = self.check_range(addr, data.len() as u64)?;
        let lanes = self.bytes[offset..offset + data.len()].iter_mut().zip(data);
        for (lane, (slot, byte)) in lanes.enumerate() {
            if (strobe >> lane) & 1 == 1 {
                *slot = *byte;
            }
        }
        Ok(())
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::AddressRange`] when `addr` is unmapped.
    pub fn write_byte(&mut self, addr: u64, value: u8) -> Result<(), BusFault> {
        self.write(addr, &[value])
    }

    /// Reads `size` bytes at `addr` as a little-endian integer, the layout
    /// memory beats use on the data bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::AddressRange`] when any byte is unmapped and
    /// [`BusFault::UnsupportedBeatSize`] for more than 16 bytes.
    pub fn read_le(&self, addr: u64, size: usize) -> Result<LogicValue, BusFault> {
        check_value_size(size)?;
        Ok(self
            .read(addr, size)?
            .iter()
            .rev()
            .fold(0, |acc, byte| (acc << 8) | LogicValue::from(*byte)))
    }

    /// Reads `size` bytes at `addr` as a big-endian integer.
    ///
    /// # Errors
    ///
    /// Same as [`BackingStore::read_le`].
    pub fn read_be(&self, addr: u64, size: usize) -> Result<LogicValue, BusFault> {
        check_value_size(size)?;
        Ok(self
            .read(addr, size)?
            .iter()
            .fold(0, |acc, byte| (acc << 8) | LogicValue::from(*byte)))
    }

    /// Stores the low `size` bytes of `value` at `addr`, least significant
    /// byte first.
    ///
    /// # Errors
    ///
    /// Same as [`BackingStore::read_le`].
    pub fn write_le(&mut self, addr: u64, value: LogicValue, size: usize) -> Result<(), BusFault> {
        check_value_size(size)?;
        let bytes = value.to_le_bytes();
        self.write(addr, &bytes[..size])
    }

    /// Stores the low `size` bytes of `value` at `addr`, most significant
    /// byte first.
    ///
    /// # Errors
    ///
    /// Same as [`BackingStore::read_le`].
    pub fn write_be(&mut self, addr: u64, value: LogicValue, size: usize) -> Result<(), BusFault> {
        check_value_size(size)?;
        let bytes = value.to_be_bytes();
        self.write(addr, &bytes[MAX_VALUE_BYTES - size..])
    }

    /// Zeroes every byte.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Replaces the contents with `size` zero bytes.
    pub fn resize(&mut self, size: usize) {
        self.bytes = vec![0; size];
    }

    /// Moves the store to a new base address.
    pub const fn set_base(&mut self, base: u64) {
        self.base = base;
    }
}

const fn check_value_size(size: usize) -> Result<(), BusFault> {
    if size > MAX_VALUE_BYTES {
        return Err(BusFault::UnsupportedBeatSize {
            size_bytes: size,
            bus_bytes: MAX_VALUE_BYTES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::BackingStore;
    use crate::BusFault;

    #[rstest]
    #[case(0x100, 1, true)]
    #[case(0x10F, 1, true)]
    #[case(0x100, 16, true)]
    #[case(0x0FF, 1, false)]
    #[case(0x10F, 2, false)]
    #[case(u64::MAX, 2, false)]
    fn range_check_respects_base_offset(#[case] addr: u64, #[case] bytes: u64, #[case] ok: bool) {
        let store = BackingStore::new(16, 0x100);
        assert_eq!(store.check_range(addr, bytes).is_ok(), ok);
    }

    #[test]
    fn out_of_range_write_leaves_store_untouched() {
        let mut store = BackingStore::new(4, 0);
        assert_eq!(
            store.write(2, &[1, 2, 3]),
            Err(BusFault::AddressRange {
                addr: 2,
                bytes: 3,
                base: 0,
                end: 4,
            })
        );
        assert_eq!(store.as_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn masked_write_applies_strobed_lanes_only() {
        let mut store = BackingStore::new(6, 0x40);

        store
            .write_masked(0x41, &[0x11, 0x22, 0x33, 0x44], 0b1010)
            .expect("in range");
        assert_eq!(store.as_bytes(), &[0, 0, 0x22, 0, 0x44, 0]);

        assert!(matches!(
            store.write_masked(0x43, &[0xFF; 4], 0b0001),
            Err(BusFault::AddressRange { .. })
        ));
        assert_eq!(store.as_bytes(), &[0, 0, 0x22, 0, 0x44, 0]);
    }

    #[test]
    fn byte_orders_are_mirror_images() {
        let mut store = BackingStore::new(8, 0);
        store.write_be(0, 0x1122_3344, 4).expect("in range");

        assert_eq!(store.as_bytes()[..4], [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(store.read_be(0, 4), Ok(0x1122_3344));
        assert_eq!(store.read_le(0, 4), Ok(0x4433_2211));
    }

    #[test]
    fn resize_and_rebase_reset_contents() {
        let mut store = BackingStore::new(4, 0);
        store.write_byte(1, 0xAB).expect("in range");
        store.resize(8);
        store.set_base(0x1000);

        assert_eq!(store.len(), 8);
        assert_eq!(store.end(), 0x1008);
        assert!(store.as_bytes().iter().all(|byte| *byte == 0));
        assert!(store.check_range(0, 1).is_err());
    }

    #[test]
    fn oversized_values_are_rejected() {
        let store = BackingStore::new(32, 0);
        assert!(matches!(
            store.read_le(0, 17),
            Err(BusFault::UnsupportedBeatSize { size_bytes: 17, .. })
        ));
    }

    proptest! {
        #[test]
        fn little_endian_write_reads_back(value in any::<u64>(), size in 1usize..=8, offset in 0u64..8) {
            let mut store = BackingStore::new(16, 0x40);
            let mask = if size == 8 { u128::from(u64::MAX) } else { (1u128 << (size * 8)) - 1 };

            store.write_le(0x40 + offset, u128::from(value), size).expect("in range");

            prop_assert_eq!(store.read_le(0x40 + offset, size), Ok(u128::from(value) & mask));
        }
    }
}
