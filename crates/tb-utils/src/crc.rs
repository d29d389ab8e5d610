const POLY: u16 = 0x1021;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut index = 0;
    let mut byte: u16 = 0;
    while index < table.len() {
        let mut crc: u16 = 0;
        let mut c = byte << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if (crc ^ c) & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            c <<= 1;
            bit += 1;
        }
        table[index] = crc;
        index += 1;
        byte += 1;
    }
    table
}

/// CRC-16/XMODEM (polynomial `0x1021`, initial value 0, no reflection) of
/// `bytes`.
#[must_use]
pub fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0, |crc, byte| {
        let [high, _] = crc.to_be_bytes();
        (crc << 8) ^ TABLE[usize::from(high ^ byte)]
    })
}

/// CRC16 of the minimal big-endian encoding of `value`.
///
/// Leading zero bytes are dropped; zero encodes as a single zero byte. Hash
/// tables in the devices under test key on this form.
#[must_use]
pub fn crc16_of_value(value: u128) -> u16 {
    let bytes = value.to_be_bytes();
    let first = bytes
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(bytes.len() - 1);
    crc16(&bytes[first..])
}
