#![no_main]

use axi_agents::{BackingStore, BurstKind, BurstRequest, Direction, LogicValue, Response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 12 {
        return;
    }

    let addr = u64::from_le_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ]);
    let len = LogicValue::from(data[8]) | (LogicValue::from(data[9] & 0x01) << 8);
    let size = LogicValue::from(data[10] & 0x0F);
    let burst = LogicValue::from(data[11] & 0x03);
    let direction = if data[11] & 0x80 == 0 {
        Direction::Read
    } else {
        Direction::Write
    };

    let _ = BurstKind::decode(burst);
    let _ = Response::from_bits(LogicValue::from(data[11] >> 2));

    let store = BackingStore::new(4096, 0x8000_0000);
    if let Ok(request) = BurstRequest::from_fields(direction, LogicValue::from(addr), len, size, burst)
    {
        let span = request.span_bytes();
        let _ = store.check_range(request.addr, span);
        for index in 0..request.beats {
            let beat = request.beat_addr(index);
            let _ = store.read_le(beat, request.beat_bytes);
        }
    }
});
