use axi_agents::{width_mask, LogicValue, StreamFrame};

use crate::UtilError;

fn bus_bytes(bus_bits: u32) -> Result<usize, UtilError> {
    if bus_bits == 0 || bus_bits % 8 != 0 || bus_bits > LogicValue::BITS {
        return Err(UtilError::InvalidBusWidth { bits: bus_bits });
    }
    Ok((bus_bits / 8) as usize)
}

/// Splits `packet` into `bus_bits`-wide words, first byte in the least
/// significant lane.
///
/// The final word's `TKEEP` marks its valid low lanes; it is omitted when
/// the word is full.
///
/// # Errors
///
/// Returns [`UtilError::InvalidBusWidth`] for widths that are not a whole
/// number of bytes up to 128 bits and [`UtilError::Bus`] for an empty
/// packet.
pub fn packet_to_stream(packet: &[u8], bus_bits: u32) -> Result<StreamFrame, UtilError> {
    let lanes = bus_bytes(bus_bits)?;
    let words = packet.chunks(lanes).map(|chunk| {
        chunk
            .iter()
            .rev()
            .fold(0, |word, byte| (word << 8) | LogicValue::from(*byte))
    });
    let frame = StreamFrame::from_words(words)?;

    let tail = packet.len() % lanes;
    Ok(if tail == 0 {
        frame
    } else {
        frame.with_last_keep((1 << tail) - 1)
    })
}

/// Reassembles the bytes carried by `frame` on a `bus_bits`-wide stream.
///
/// # Errors
///
/// Returns [`UtilError::InvalidBusWidth`] for unsupported widths and
/// [`UtilError::InvalidKeep`] when the final `TKEEP` is not a contiguous run
/// of low lanes.
pub fn stream_to_packet(frame: &StreamFrame, bus_bits: u32) -> Result<Vec<u8>, UtilError> {
    let lanes = bus_bytes(bus_bits)?;
    let tail = match frame.last_keep() {
        None => lanes,
        Some(keep) => {
            if keep == 0 || keep & keep.wrapping_add(1) != 0 || keep > width_mask(bus_bits / 8) {
                return Err(UtilError::InvalidKeep { keep });
            }
            keep.trailing_ones() as usize
        }
    };

    let mut packet = Vec::with_capacity(frame.beats() * lanes);
    for (index, word) in frame.data().iter().enumerate() {
        let valid = if frame.is_last(index) { tail } else { lanes };
        packet.extend_from_slice(&word.to_le_bytes()[..valid]);
    }
    Ok(packet)
}
