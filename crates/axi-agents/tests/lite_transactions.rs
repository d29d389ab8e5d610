//! AXI4-Lite transactors against a register-file device model.

use std::collections::BTreeMap;

use axi_agents::{
    BusFault, DriveLine, EdgeAgent, EdgeContext, LiteConfig, LiteReader, LiteWrite, LiteWriter,
    Progress, Response, SignalBank, SignalId, TbError, Testbench, TestbenchConfig, TraceEvent,
};
use proptest::prelude::*;
use rand as _;
use rand_xoshiro as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;
use tracing_subscriber as _;

const SIGNALS: [(&str, u32); 16] = [
    ("s_axi_awaddr", 16),
    ("s_axi_awvalid", 1),
    ("s_axi_awready", 1),
    ("s_axi_wdata", 32),
    ("s_axi_wstrb", 4),
    ("s_axi_wvalid", 1),
    ("s_axi_wready", 1),
    ("s_axi_bresp", 2),
    ("s_axi_bvalid", 1),
    ("s_axi_bready", 1),
    ("s_axi_araddr", 16),
    ("s_axi_arvalid", 1),
    ("s_axi_arready", 1),
    ("s_axi_rdata", 32),
    ("s_axi_rresp", 2),
    ("s_axi_rvalid", 1),
];

/// 32-bit register file answering one write and one read at a time.
struct RegisterFile {
    awaddr: SignalId,
    awvalid: SignalId,
    wdata: SignalId,
    wstrb: SignalId,
    wvalid: SignalId,
    bready: SignalId,
    araddr: SignalId,
    arvalid: SignalId,
    rready: SignalId,
    awready: DriveLine,
    wready: DriveLine,
    bresp: DriveLine,
    bvalid: DriveLine,
    arready: DriveLine,
    rdata: DriveLine,
    rresp: DriveLine,
    rvalid: DriveLine,
    regs: BTreeMap<u64, u128>,
    slverr_at: Option<u64>,
    aw: Option<u64>,
    w: Option<(u128, u128)>,
    b_pending: bool,
    r_pending: bool,
}

impl RegisterFile {
    fn connect(bus: &mut SignalBank, slverr_at: Option<u64>) -> Self {
        let id = |bus: &SignalBank, name: &str| bus.resolve(name).expect("declared");
        Self {
            awaddr: id(bus, "s_axi_awaddr"),
            awvalid: id(bus, "s_axi_awvalid"),
            wdata: id(bus, "s_axi_wdata"),
            wstrb: id(bus, "s_axi_wstrb"),
            wvalid: id(bus, "s_axi_wvalid"),
            bready: id(bus, "s_axi_bready"),
            araddr: id(bus, "s_axi_araddr"),
            arvalid: id(bus, "s_axi_arvalid"),
            rready: id(bus, "s_axi_rready"),
            awready: bus.claim_named("s_axi_awready").expect("claim"),
            wready: bus.claim_named("s_axi_wready").expect("claim"),
            bresp: bus.claim_named("s_axi_bresp").expect("claim"),
            bvalid: bus.claim_named("s_axi_bvalid").expect("claim"),
            arready: bus.claim_named("s_axi_arready").expect("claim"),
            rdata: bus.claim_named("s_axi_rdata").expect("claim"),
            rresp: bus.claim_named("s_axi_rresp").expect("claim"),
            rvalid: bus.claim_named("s_axi_rvalid").expect("claim"),
            regs: BTreeMap::new(),
            slverr_at,
            aw: None,
            w: None,
            b_pending: false,
            r_pending: false,
        }
    }

    fn apply(&mut self, addr: u64, data: u128, strobe: u128) {
        let old = self.regs.get(&addr).copied().unwrap_or(0);
        let mask = (0..4)
            .filter(|lane| (strobe >> lane) & 1 == 1)
            .fold(0u128, |mask, lane| mask | (0xFF << (8 * lane)));
        self.regs.insert(addr, (old & !mask) | (data & mask));
    }
}

impl EdgeAgent for RegisterFile {
    fn name(&self) -> &str {
        "regfile"
    }

    fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
        if self.aw.is_none() && ctx.is_high(self.awvalid) && ctx.is_high(self.awready.id()) {
            self.aw = Some(u64::try_from(ctx.get(self.awaddr)).expect("16-bit address"));
        }
        if self.w.is_none() && ctx.is_high(self.wvalid) && ctx.is_high(self.wready.id()) {
            self.w = Some((ctx.get(self.wdata), ctx.get(self.wstrb)));
        }
        if self.b_pending && ctx.is_high(self.bvalid.id()) && ctx.is_high(self.bready) {
            self.b_pending = false;
        }
        if !self.b_pending {
            if let (Some(addr), Some((data, strobe))) = (self.aw, self.w) {
                let resp = if self.slverr_at == Some(addr) {
                    Response::SlvErr
                } else {
                    self.apply(addr, data, strobe);
                    Response::Okay
                };
                ctx.drive(&self.bresp, resp.bits());
                self.b_pending = true;
                self.aw = None;
                self.w = None;
            }
        }
        ctx.drive(&self.awready, u128::from(self.aw.is_none() && !self.b_pending));
        ctx.drive(&self.wready, u128::from(self.w.is_none() && !self.b_pending));
        ctx.drive(&self.bvalid, u128::from(self.b_pending));

        if self.r_pending && ctx.is_high(self.rvalid.id()) && ctx.is_high(self.rready) {
            self.r_pending = false;
        } else if !self.r_pending && ctx.is_high(self.arvalid) && ctx.is_high(self.arready.id()) {
            let addr = u64::try_from(ctx.get(self.araddr)).expect("16-bit address");
            let resp = if self.slverr_at == Some(addr) {
                Response::SlvErr
            } else {
                Response::Okay
            };
            ctx.drive(&self.rdata, self.regs.get(&addr).copied().unwrap_or(0));
            ctx.drive(&self.rresp, resp.bits());
            self.r_pending = true;
        }
        ctx.drive(&self.arready, u128::from(!self.r_pending));
        ctx.drive(&self.rvalid, u128::from(self.r_pending));
        Ok(Progress::Waiting)
    }
}

struct Rig {
    tb: Testbench,
    writer: LiteWriter,
    reader: LiteReader,
    device: RegisterFile,
}

fn rig(config: TestbenchConfig, slverr_at: Option<u64>) -> Rig {
    let mut bus = SignalBank::new();
    for (name, width) in SIGNALS {
        bus.declare(name, width).expect("declare");
    }
    bus.declare("s_axi_rready", 1).expect("declare");

    let lite = LiteConfig::default();
    let writer = LiteWriter::connect(&mut bus, &lite).expect("writer");
    let reader = LiteReader::connect(&mut bus, &lite).expect("reader");
    let device = RegisterFile::connect(&mut bus, slverr_at);
    Rig {
        tb: Testbench::new(bus, config),
        writer,
        reader,
        device,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn write_then_read_returns_written_data(word in 0u64..64, data in any::<u32>()) {
        let Rig { mut tb, mut writer, mut reader, mut device } =
            rig(TestbenchConfig::default(), None);
        let addr = word * 4;

        let resp = writer
            .write(&mut tb, &mut [&mut device], addr, u128::from(data))
            .expect("write");
        let read = reader.read(&mut tb, &mut [&mut device], addr).expect("read");

        prop_assert_eq!(resp, Response::Okay);
        prop_assert_eq!(read.data, u128::from(data));
        prop_assert_eq!(read.resp, Response::Okay);
    }
}

#[test]
fn slave_error_surfaces_as_bus_error_without_mutation() {
    let Rig {
        mut tb,
        mut writer,
        mut device,
        ..
    } = rig(TestbenchConfig::default(), Some(0x10));

    let err = writer
        .write(&mut tb, &mut [&mut device], 0x10, 0x1234)
        .expect_err("slave error");

    assert_eq!(
        err,
        TbError::Fault(BusFault::BusError {
            channel: axi_agents::Channel::WriteResponse,
            addr: 0x10,
            resp: Response::SlvErr,
        })
    );
    assert!(device.regs.is_empty());
}

#[test]
fn read_error_status_surfaces_as_bus_error() {
    let Rig {
        mut tb,
        mut reader,
        mut device,
        ..
    } = rig(TestbenchConfig::default(), Some(0x8));

    assert!(matches!(
        reader.read(&mut tb, &mut [&mut device], 0x8),
        Err(TbError::Fault(BusFault::BusError {
            resp: Response::SlvErr,
            ..
        }))
    ));
}

#[rstest]
#[case(0b1111, 0x1122_3344)]
#[case(0b0101, 0xAA22_CC44)]
#[case(0b1000, 0x11BB_CCDD)]
#[case(0b0000, 0xAABB_CCDD)]
fn strobe_selects_updated_lanes(#[case] strobe: u128, #[case] expected: u128) {
    let Rig {
        mut tb,
        mut writer,
        mut reader,
        mut device,
    } = rig(TestbenchConfig::default(), None);

    writer
        .write(&mut tb, &mut [&mut device], 0x20, 0xAABB_CCDD)
        .expect("seed");
    writer
        .submit(
            &mut tb,
            &mut [&mut device],
            LiteWrite::new(0x20, 0x1122_3344).with_strobe(strobe),
        )
        .expect("strobed write");

    let read = reader.read(&mut tb, &mut [&mut device], 0x20).expect("read");
    assert_eq!(read.data, expected);
}

#[test]
fn writer_without_a_device_times_out() {
    let Rig { mut tb, mut writer, .. } = rig(
        TestbenchConfig::default().with_max_wait_edges(Some(20)),
        None,
    );

    assert_eq!(
        writer.write(&mut tb, &mut [], 0x0, 0x1),
        Err(TbError::Timeout { edges: 20 })
    );
    assert!(writer.is_busy());
}

#[test]
fn trace_records_both_handshakes_before_the_response() {
    let Rig {
        mut tb,
        mut writer,
        mut device,
        ..
    } = rig(TestbenchConfig::default().with_trace(), None);

    writer
        .write(&mut tb, &mut [&mut device], 0x4, 0x55)
        .expect("write");

    let kinds: Vec<_> = tb
        .trace()
        .events()
        .iter()
        .map(|event| match event {
            TraceEvent::Handshake { channel, .. } => channel.to_string(),
            TraceEvent::TransactionCompleted { resp, .. } => resp.to_string(),
            other => format!("{other:?}"),
        })
        .collect();
    assert_eq!(kinds, vec!["AW", "W", "OKAY"]);
}
