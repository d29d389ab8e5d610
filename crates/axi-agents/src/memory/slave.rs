use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{debug, trace, warn};

use super::{BackingStore, LatencyProfile, MemorySlaveConfig, SlaveStats};
use crate::{
    BurstKind, BurstRequest, BusFault, Channel, Direction, DriveLine, EdgeAgent, EdgeContext,
    LogicValue, PortNames, Progress, Response, SignalAdapter, SignalError, SignalId, TbError,
    TraceEvent,
};

#[derive(Debug)]
struct ReadPorts {
    araddr: SignalId,
    arlen: SignalId,
    arsize: SignalId,
    arburst: Option<SignalId>,
    arvalid: SignalId,
    arready: DriveLine,
    rdata: DriveLine,
    rresp: Option<DriveLine>,
    rlast: DriveLine,
    rvalid: DriveLine,
    rready: SignalId,
    bus_bytes: usize,
}

impl ReadPorts {
    fn connect(bus: &mut dyn SignalAdapter, ports: &PortNames) -> Result<Self, SignalError> {
        let rdata = ports.claim(bus, "rdata")?;
        let bus_bytes = data_bus_bytes(bus, rdata.id());
        Ok(Self {
            araddr: ports.required(bus, "araddr")?,
            arlen: ports.required(bus, "arlen")?,
            arsize: ports.required(bus, "arsize")?,
            arburst: ports.optional(bus, "arburst"),
            arvalid: ports.required(bus, "arvalid")?,
            arready: ports.claim(bus, "arready")?,
            rdata,
            rresp: ports.claim_optional(bus, "rresp")?,
            rlast: ports.claim(bus, "rlast")?,
            rvalid: ports.claim(bus, "rvalid")?,
            rready: ports.required(bus, "rready")?,
            bus_bytes,
        })
    }
}

#[derive(Debug)]
struct WritePorts {
    awaddr: SignalId,
    awlen: SignalId,
    awsize: SignalId,
    awburst: Option<SignalId>,
    awvalid: SignalId,
    awready: DriveLine,
    wdata: SignalId,
    wstrb: Option<SignalId>,
    wlast: SignalId,
    wvalid: SignalId,
    wready: DriveLine,
    bresp: Option<DriveLine>,
    bvalid: DriveLine,
    bready: SignalId,
    bus_bytes: usize,
}

impl WritePorts {
    fn connect(bus: &mut dyn SignalAdapter, ports: &PortNames) -> Result<Self, SignalError> {
        let wdata = ports.required(bus, "wdata")?;
        Ok(Self {
            awaddr: ports.required(bus, "awaddr")?,
            awlen: ports.required(bus, "awlen")?,
            awsize: ports.required(bus, "awsize")?,
            awburst: ports.optional(bus, "awburst"),
            awvalid: ports.required(bus, "awvalid")?,
            awready: ports.claim(bus, "awready")?,
            wdata,
            wstrb: ports.optional(bus, "wstrb"),
            wlast: ports.required(bus, "wlast")?,
            wvalid: ports.required(bus, "wvalid")?,
            wready: ports.claim(bus, "wready")?,
            bresp: ports.claim_optional(bus, "bresp")?,
            bvalid: ports.claim(bus, "bvalid")?,
            bready: ports.required(bus, "bready")?,
            bus_bytes: data_bus_bytes(bus, wdata),
        })
    }
}

fn data_bus_bytes(bus: &dyn SignalAdapter, id: SignalId) -> usize {
    (bus.width(id) / 8).max(1) as usize
}

/// Address and progress of the burst being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutstandingBurst {
    addr: u64,
    remaining: u16,
    beats: u16,
    beat_bytes: usize,
    kind: BurstKind,
    resp: Response,
}

impl OutstandingBurst {
    const fn new(request: &BurstRequest, resp: Response) -> Self {
        Self {
            addr: request.addr,
            remaining: request.beats,
            beats: request.beats,
            beat_bytes: request.beat_bytes,
            kind: request.kind,
            resp,
        }
    }

    const fn is_last(&self) -> bool {
        self.remaining <= 1
    }

    const fn index(&self) -> u16 {
        self.beats - self.remaining
    }

    fn advance(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.kind == BurstKind::Incr {
            self.addr = self.addr.wrapping_add(self.beat_bytes as u64);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlaveState {
    Idle,
    AddressWait {
        direction: Direction,
        delay: u32,
    },
    AddressReady {
        direction: Direction,
    },
    ReadGap {
        burst: OutstandingBurst,
        delay: u32,
    },
    ReadBeat {
        burst: OutstandingBurst,
    },
    WriteStall {
        burst: OutstandingBurst,
        delay: u32,
    },
    WriteBeat {
        burst: OutstandingBurst,
    },
    WriteResponse {
        resp: Response,
        beats: u16,
    },
}

/// Responder answering AXI4 bursts from a [`BackingStore`].
#[derive(Debug)]
pub struct MemorySlave {
    name: String,
    read: ReadPorts,
    write: Option<WritePorts>,
    store: BackingStore,
    latency: LatencyProfile,
    rng: Xoshiro256StarStar,
    state: SlaveState,
    faults: Vec<BusFault>,
    stats: SlaveStats,
    rejected_read: bool,
    rejected_write: bool,
}

impl MemorySlave {
    /// Resolves the read channels, and the write channels when enabled, and
    /// claims every slave-driven signal.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when a mandatory signal is missing or already
    /// driven by another agent.
    pub fn connect(
        bus: &mut dyn SignalAdapter,
        config: &MemorySlaveConfig,
    ) -> Result<Self, SignalError> {
        let ports = config.ports();
        let read = ReadPorts::connect(bus, &ports)?;
        let write = if config.enable_writes {
            Some(WritePorts::connect(bus, &ports)?)
        } else {
            None
        };

        Ok(Self {
            name: ports.prefix().to_string(),
            read,
            write,
            store: BackingStore::new(config.size, config.base),
            latency: config.latency,
            rng: Xoshiro256StarStar::seed_from_u64(config.latency.seed),
            state: SlaveState::Idle,
            faults: Vec::new(),
            stats: SlaveStats::default(),
            rejected_read: false,
            rejected_write: false,
        })
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &BackingStore {
        &self.store
    }

    /// Returns the backing store for host-side preloading and inspection.
    pub const fn store_mut(&mut self) -> &mut BackingStore {
        &mut self.store
    }

    /// Returns logged faults in detection order.
    #[must_use]
    pub fn faults(&self) -> &[BusFault] {
        &self.faults
    }

    /// Removes and returns logged faults.
    pub fn take_faults(&mut self) -> Vec<BusFault> {
        std::mem::take(&mut self.faults)
    }

    /// Returns the transfer counters.
    #[must_use]
    pub const fn stats(&self) -> &SlaveStats {
        &self.stats
    }

    /// Returns `true` when no burst is being served.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, SlaveState::Idle)
    }

    /// Drives every slave output low and abandons the current burst.
    pub fn reset(&mut self, bus: &mut dyn SignalAdapter) {
        bus.drive(&self.read.arready, 0);
        bus.drive(&self.read.rvalid, 0);
        bus.drive(&self.read.rlast, 0);
        bus.drive(&self.read.rdata, 0);
        if let Some(rresp) = &self.read.rresp {
            bus.drive(rresp, 0);
        }
        if let Some(write) = &self.write {
            bus.drive(&write.awready, 0);
            bus.drive(&write.wready, 0);
            bus.drive(&write.bvalid, 0);
            if let Some(bresp) = &write.bresp {
                bus.drive(bresp, 0);
            }
        }
        self.state = SlaveState::Idle;
        self.rejected_read = false;
        self.rejected_write = false;
    }

    fn draw(&mut self, max: u32) -> u32 {
        if max == 0 {
            0
        } else {
            self.rng.gen_range(0..=max)
        }
    }

    fn address_valid(&self, ctx: &EdgeContext<'_>, direction: Direction) -> bool {
        match (direction, &self.write) {
            (Direction::Read, _) => ctx.is_high(self.read.arvalid),
            (Direction::Write, Some(write)) => ctx.is_high(write.awvalid),
            (Direction::Write, None) => false,
        }
    }

    fn drive_address_ready(&self, ctx: &mut EdgeContext<'_>, direction: Direction, ready: bool) {
        let line = match (direction, &self.write) {
            (Direction::Read, _) => &self.read.arready,
            (Direction::Write, Some(write)) => &write.awready,
            (Direction::Write, None) => return,
        };
        ctx.drive(line, LogicValue::from(ready));
    }

    fn log_fault(&mut self, ctx: &mut EdgeContext<'_>, fault: BusFault) {
        warn!(agent = %self.name, edge = ctx.edge(), %fault, "memory slave fault");
        if ctx.tracing() {
            ctx.emit(TraceEvent::Fault {
                edge: ctx.edge(),
                agent: self.name.clone(),
                fault: fault.clone(),
            });
        }
        self.stats.faults += 1;
        self.faults.push(fault);
    }

    fn raise(&mut self, ctx: &mut EdgeContext<'_>, fault: BusFault) -> TbError {
        self.log_fault(ctx, fault.clone());
        fault.into()
    }

    fn idle(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
        if ctx.is_high(self.read.arvalid) {
            if !self.rejected_read {
                let kind = burst_kind(ctx, self.read.arburst);
                return match kind {
                    Ok(_) => Ok(self.begin_request(ctx, Direction::Read)),
                    Err(fault) => {
                        self.rejected_read = true;
                        Err(self.raise(ctx, fault))
                    }
                };
            }
        } else {
            self.rejected_read = false;
        }

        let Some(write) = &self.write else {
            return Ok(Progress::Waiting);
        };
        if ctx.is_high(write.awvalid) {
            if !self.rejected_write {
                let kind = burst_kind(ctx, write.awburst);
                return match kind {
                    Ok(_) => Ok(self.begin_request(ctx, Direction::Write)),
                    Err(fault) => {
                        self.rejected_write = true;
                        Err(self.raise(ctx, fault))
                    }
                };
            }
        } else {
            self.rejected_write = false;
        }
        Ok(Progress::Waiting)
    }

    fn begin_request(&mut self, ctx: &mut EdgeContext<'_>, direction: Direction) -> Progress {
        let delay = self.draw(self.latency.address_delay_max);
        trace!(agent = %self.name, ?direction, delay, "address request seen");
        if delay == 0 {
            self.drive_address_ready(ctx, direction, true);
            self.state = SlaveState::AddressReady { direction };
        } else {
            self.state = SlaveState::AddressWait { direction, delay };
        }
        Progress::Waiting
    }

    fn withdrawn(&mut self, ctx: &mut EdgeContext<'_>, direction: Direction) -> TbError {
        self.drive_address_ready(ctx, direction, false);
        self.state = SlaveState::Idle;
        let fault = BusFault::ProtocolViolation {
            channel: direction.address_channel(),
            detail: "address valid withdrawn before handshake".to_string(),
        };
        self.raise(ctx, fault)
    }

    fn latch_request(
        &self,
        ctx: &EdgeContext<'_>,
        direction: Direction,
    ) -> Result<BurstRequest, BusFault> {
        let incr = BurstKind::Incr.bits();
        let (addr, len, size, burst) = match (direction, &self.write) {
            (Direction::Read, _) => (
                self.read.araddr,
                self.read.arlen,
                self.read.arsize,
                self.read.arburst,
            ),
            (Direction::Write, Some(write)) => {
                (write.awaddr, write.awlen, write.awsize, write.awburst)
            }
            (Direction::Write, None) => {
                return Err(BusFault::ProtocolViolation {
                    channel: Channel::WriteAddress,
                    detail: "write channels are disabled".to_string(),
                })
            }
        };
        BurstRequest::from_fields(
            direction,
            ctx.get(addr),
            ctx.get(len),
            ctx.get(size),
            burst.map_or(incr, |id| ctx.get(id)),
        )
    }

    fn validate(&mut self, ctx: &mut EdgeContext<'_>, request: &BurstRequest) -> Response {
        let bus_bytes = match (request.direction, &self.write) {
            (Direction::Write, Some(write)) => write.bus_bytes,
            _ => self.read.bus_bytes,
        };

        let fault = if request.beat_bytes > bus_bytes {
            Some(BusFault::UnsupportedBeatSize {
                size_bytes: request.beat_bytes,
                bus_bytes,
            })
        } else {
            self.store
                .check_range(request.addr, request.span_bytes())
                .err()
        };

        match fault {
            Some(fault) => {
                let resp = fault.response();
                self.stats.error_responses += 1;
                self.log_fault(ctx, fault);
                resp
            }
            None => Response::Okay,
        }
    }

    fn handshake(
        &mut self,
        ctx: &mut EdgeContext<'_>,
        direction: Direction,
    ) -> Result<Progress, TbError> {
        self.drive_address_ready(ctx, direction, false);
        let request = match self.latch_request(ctx, direction) {
            Ok(request) => request,
            Err(fault) => {
                self.state = SlaveState::Idle;
                return Err(self.raise(ctx, fault));
            }
        };

        debug!(
            agent = %self.name,
            ?direction,
            addr = request.addr,
            beats = request.beats,
            beat_bytes = request.beat_bytes,
            kind = ?request.kind,
            "burst accepted"
        );
        if ctx.tracing() {
            ctx.emit(TraceEvent::BurstAccepted {
                edge: ctx.edge(),
                agent: self.name.clone(),
                request,
            });
        }

        let resp = self.validate(ctx, &request);
        let burst = OutstandingBurst::new(&request, resp);
        let delay = self.draw(self.latency.address_delay_max);
        self.state = match direction {
            Direction::Read if delay == 0 => {
                self.present_read(ctx, &burst);
                SlaveState::ReadBeat { burst }
            }
            Direction::Read => SlaveState::ReadGap { burst, delay },
            Direction::Write if delay == 0 => {
                self.drive_write_ready(ctx, true);
                SlaveState::WriteBeat { burst }
            }
            Direction::Write => SlaveState::WriteStall { burst, delay },
        };
        Ok(Progress::Waiting)
    }

    fn present_read(&self, ctx: &mut EdgeContext<'_>, burst: &OutstandingBurst) {
        let data = if burst.resp == Response::Okay {
            self.store
                .read_le(burst.addr, burst.beat_bytes)
                .unwrap_or(0)
        } else {
            0
        };
        ctx.drive(&self.read.rdata, data);
        ctx.drive(&self.read.rlast, LogicValue::from(burst.is_last()));
        if let Some(rresp) = &self.read.rresp {
            ctx.drive(rresp, burst.resp.bits());
        }
        ctx.drive(&self.read.rvalid, 1);
    }

    fn read_beat(
        &mut self,
        ctx: &mut EdgeContext<'_>,
        mut burst: OutstandingBurst,
    ) -> Progress {
        if !(ctx.is_high(self.read.rvalid.id()) && ctx.is_high(self.read.rready)) {
            return Progress::Waiting;
        }

        self.stats.read_beats += 1;
        if ctx.tracing() {
            ctx.emit(TraceEvent::Handshake {
                edge: ctx.edge(),
                agent: self.name.clone(),
                channel: Channel::ReadData,
                value: ctx.get(self.read.rdata.id()),
            });
        }

        if burst.is_last() {
            ctx.drive(&self.read.rvalid, 0);
            ctx.drive(&self.read.rlast, 0);
            self.stats.reads_completed += 1;
            debug!(agent = %self.name, beats = burst.beats, resp = %burst.resp, "read burst complete");
            if ctx.tracing() {
                ctx.emit(TraceEvent::TransactionCompleted {
                    edge: ctx.edge(),
                    agent: self.name.clone(),
                    direction: Direction::Read,
                    beats: burst.beats,
                    resp: burst.resp,
                });
            }
            self.state = SlaveState::Idle;
            return Progress::Complete;
        }

        burst.advance();
        let gap = self.draw(self.latency.beat_gap_max);
        if gap == 0 {
            self.present_read(ctx, &burst);
            self.state = SlaveState::ReadBeat { burst };
        } else {
            ctx.drive(&self.read.rvalid, 0);
            self.state = SlaveState::ReadGap { burst, delay: gap };
        }
        Progress::Waiting
    }

    fn drive_write_ready(&self, ctx: &mut EdgeContext<'_>, ready: bool) {
        if let Some(write) = &self.write {
            ctx.drive(&write.wready, LogicValue::from(ready));
        }
    }

    fn write_beat(
        &mut self,
        ctx: &mut EdgeContext<'_>,
        mut burst: OutstandingBurst,
    ) -> Result<Progress, TbError> {
        let Some(write) = &self.write else {
            self.state = SlaveState::Idle;
            return Ok(Progress::Waiting);
        };
        if !(ctx.is_high(write.wready.id()) && ctx.is_high(write.wvalid)) {
            return Ok(Progress::Waiting);
        }

        let data = ctx.get(write.wdata);
        let strobe = write.wstrb.map_or(LogicValue::MAX, |id| ctx.get(id));
        let wlast = ctx.is_high(write.wlast);
        self.stats.write_beats += 1;
        if ctx.tracing() {
            ctx.emit(TraceEvent::Handshake {
                edge: ctx.edge(),
                agent: self.name.clone(),
                channel: Channel::WriteData,
                value: data,
            });
        }

        if wlast != burst.is_last() {
            self.drive_write_ready(ctx, false);
            self.state = SlaveState::Idle;
            let fault = BusFault::ProtocolViolation {
                channel: Channel::WriteData,
                detail: format!(
                    "WLAST={} on beat {} of {}",
                    u8::from(wlast),
                    burst.index() + 1,
                    burst.beats
                ),
            };
            return Err(self.raise(ctx, fault));
        }

        if burst.resp == Response::Okay {
            self.store_beat(&burst, data, strobe)?;
        }

        if burst.is_last() {
            self.drive_write_ready(ctx, false);
            if let Some(write) = &self.write {
                if let Some(bresp) = &write.bresp {
                    ctx.drive(bresp, burst.resp.bits());
                }
                ctx.drive(&write.bvalid, 1);
            }
            self.state = SlaveState::WriteResponse {
                resp: burst.resp,
                beats: burst.beats,
            };
            return Ok(Progress::Waiting);
        }

        burst.advance();
        let stall = if self.latency.write_stall_max > 0
            && self.latency.write_stall_percent > 0
            && self.rng.gen_range(0..100u8) < self.latency.write_stall_percent
        {
            self.rng.gen_range(1..=self.latency.write_stall_max)
        } else {
            0
        };
        if stall == 0 {
            self.state = SlaveState::WriteBeat { burst };
        } else {
            trace!(agent = %self.name, stall, "wready stall");
            self.drive_write_ready(ctx, false);
            self.state = SlaveState::WriteStall {
                burst,
                delay: stall,
            };
        }
        Ok(Progress::Waiting)
    }

    fn store_beat(
        &mut self,
        burst: &OutstandingBurst,
        data: LogicValue,
        strobe: LogicValue,
    ) -> Result<(), BusFault> {
        let lanes = data.to_le_bytes();
        let width = burst.beat_bytes.min(lanes.len());
        self.store.write_masked(burst.addr, &lanes[..width], strobe)
    }

    fn write_response(
        &mut self,
        ctx: &mut EdgeContext<'_>,
        resp: Response,
        beats: u16,
    ) -> Progress {
        let Some(write) = &self.write else {
            self.state = SlaveState::Idle;
            return Progress::Waiting;
        };
        if !(ctx.is_high(write.bvalid.id()) && ctx.is_high(write.bready)) {
            return Progress::Waiting;
        }

        ctx.drive(&write.bvalid, 0);
        self.stats.writes_completed += 1;
        debug!(agent = %self.name, beats, %resp, "write burst complete");
        if ctx.tracing() {
            ctx.emit(TraceEvent::TransactionCompleted {
                edge: ctx.edge(),
                agent: self.name.clone(),
                direction: Direction::Write,
                beats,
                resp,
            });
        }
        self.state = SlaveState::Idle;
        Progress::Complete
    }
}

fn burst_kind(ctx: &EdgeContext<'_>, burst: Option<SignalId>) -> Result<BurstKind, BusFault> {
    burst.map_or(Ok(BurstKind::Incr), |id| BurstKind::decode(ctx.get(id)))
}

impl EdgeAgent for MemorySlave {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
        match self.state {
            SlaveState::Idle => self.idle(ctx),
            SlaveState::AddressWait { direction, delay } => {
                if !self.address_valid(ctx, direction) {
                    return Err(self.withdrawn(ctx, direction));
                }
                if delay <= 1 {
                    self.drive_address_ready(ctx, direction, true);
                    self.state = SlaveState::AddressReady { direction };
                } else {
                    self.state = SlaveState::AddressWait {
                        direction,
                        delay: delay - 1,
                    };
                }
                Ok(Progress::Waiting)
            }
            SlaveState::AddressReady { direction } => {
                if !self.address_valid(ctx, direction) {
                    return Err(self.withdrawn(ctx, direction));
                }
                self.handshake(ctx, direction)
            }
            SlaveState::ReadGap { burst, delay } => {
                if delay <= 1 {
                    self.present_read(ctx, &burst);
                    self.state = SlaveState::ReadBeat { burst };
                } else {
                    self.state = SlaveState::ReadGap {
                        burst,
                        delay: delay - 1,
                    };
                }
                Ok(Progress::Waiting)
            }
            SlaveState::ReadBeat { burst } => Ok(self.read_beat(ctx, burst)),
            SlaveState::WriteStall { burst, delay } => {
                if delay <= 1 {
                    self.drive_write_ready(ctx, true);
                    self.state = SlaveState::WriteBeat { burst };
                } else {
                    self.state = SlaveState::WriteStall {
                        burst,
                        delay: delay - 1,
                    };
                }
                Ok(Progress::Waiting)
            }
            SlaveState::WriteBeat { burst } => self.write_beat(ctx, burst),
            SlaveState::WriteResponse { resp, beats } => Ok(self.write_response(ctx, resp, beats)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemorySlave;
    use crate::{
        MemorySlaveConfig, SignalAdapter, SignalBank, SignalError, Testbench, TestbenchConfig,
    };

    fn read_bus() -> SignalBank {
        let mut bus = SignalBank::new();
        for (name, width) in [
            ("m_axi_araddr", 32),
            ("m_axi_arlen", 8),
            ("m_axi_arsize", 3),
            ("m_axi_arvalid", 1),
            ("m_axi_arready", 1),
            ("m_axi_rdata", 32),
            ("m_axi_rlast", 1),
            ("m_axi_rvalid", 1),
            ("m_axi_rready", 1),
        ] {
            bus.declare(name, width).expect("declare");
        }
        bus
    }

    #[test]
    fn read_only_slave_ignores_missing_write_channels() {
        let mut bus = read_bus();
        let slave = MemorySlave::connect(&mut bus, &MemorySlaveConfig::default().read_only())
            .expect("read channels suffice");

        assert!(slave.is_idle());
        assert_eq!(slave.store().len(), crate::memory::DEFAULT_MEMORY_BYTES);
    }

    #[test]
    fn write_channels_are_required_when_enabled() {
        let mut bus = read_bus();
        assert_eq!(
            MemorySlave::connect(&mut bus, &MemorySlaveConfig::default()).map(|_| ()),
            Err(SignalError::Unknown("m_axi_wdata".to_string()))
        );
    }

    #[test]
    fn idle_slave_holds_outputs_low() {
        let mut bus = read_bus();
        let mut slave =
            MemorySlave::connect(&mut bus, &MemorySlaveConfig::default().read_only())
                .expect("connect");
        let mut tb = Testbench::new(bus, TestbenchConfig::default());

        slave.reset(tb.bus_mut());
        tb.run_cycles(3, &mut [&mut slave]).expect("idle run");

        let bus = tb.bus();
        for name in ["m_axi_arready", "m_axi_rvalid", "m_axi_rlast"] {
            assert_eq!(bus.get(bus.resolve(name).expect("declared")), 0, "{name}");
        }
        assert!(slave.faults().is_empty());
    }
}
