use tracing::{debug, warn};

use super::LiteConfig;
use crate::{
    width_mask, BusFault, Channel, Direction, DriveLine, EdgeAgent, EdgeContext, LiteWrite,
    LogicValue, Progress, Response, SignalAdapter, SignalError, SignalId, TbError, Testbench,
    TraceEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Idle,
    Request {
        addr: u64,
        aw_pending: bool,
        w_pending: bool,
    },
    Response {
        addr: u64,
    },
}

/// AXI4-Lite write transactor.
#[derive(Debug)]
pub struct LiteWriter {
    name: String,
    awaddr: DriveLine,
    awvalid: DriveLine,
    wdata: DriveLine,
    wstrb: DriveLine,
    wvalid: DriveLine,
    bready: DriveLine,
    awready: SignalId,
    wready: SignalId,
    bvalid: SignalId,
    bresp: Option<SignalId>,
    full_strobe: LogicValue,
    state: WriteState,
    completed: Option<(u64, Response)>,
}

impl LiteWriter {
    /// Resolves the write channels and claims their master-side signals.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when a mandatory signal is missing or already
    /// driven by another agent.
    pub fn connect(bus: &mut dyn SignalAdapter, config: &LiteConfig) -> Result<Self, SignalError> {
        let ports = config.ports();
        let wstrb = ports.claim(bus, "wstrb")?;
        let full_strobe = width_mask(bus.width(wstrb.id()));

        Ok(Self {
            name: format!("{}.write", ports.prefix()),
            awaddr: ports.claim(bus, "awaddr")?,
            awvalid: ports.claim(bus, "awvalid")?,
            wdata: ports.claim(bus, "wdata")?,
            wstrb,
            wvalid: ports.claim(bus, "wvalid")?,
            bready: ports.claim(bus, "bready")?,
            awready: ports.required(bus, "awready")?,
            wready: ports.required(bus, "wready")?,
            bvalid: ports.required(bus, "bvalid")?,
            bresp: ports.optional(bus, "bresp"),
            full_strobe,
            state: WriteState::Idle,
            completed: None,
        })
    }

    /// Returns `true` while a write is outstanding.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        !matches!(self.state, WriteState::Idle)
    }

    /// Drives idle values and abandons any outstanding write.
    pub fn reset(&mut self, bus: &mut dyn SignalAdapter) {
        bus.drive(&self.awvalid, 0);
        bus.drive(&self.wvalid, 0);
        bus.drive(&self.bready, 0);
        bus.drive(&self.wstrb, self.full_strobe);
        self.state = WriteState::Idle;
        self.completed = None;
    }

    /// Presents a write on the address and data channels.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Busy`] when a write is already outstanding.
    pub fn begin_write(
        &mut self,
        bus: &mut dyn SignalAdapter,
        request: LiteWrite,
    ) -> Result<(), TbError> {
        if self.is_busy() {
            return Err(TbError::Busy {
                agent: self.name.clone(),
            });
        }

        bus.drive(&self.awaddr, LogicValue::from(request.addr));
        bus.drive(&self.awvalid, 1);
        bus.drive(&self.wdata, request.data);
        bus.drive(&self.wstrb, request.strobe.unwrap_or(self.full_strobe));
        bus.drive(&self.wvalid, 1);
        bus.drive(&self.bready, 0);

        debug!(agent = %self.name, addr = request.addr, data = %request.data, "lite write issued");
        self.completed = None;
        self.state = WriteState::Request {
            addr: request.addr,
            aw_pending: true,
            w_pending: true,
        };
        Ok(())
    }

    /// Takes the response of the last completed write.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Incomplete`] when no write has completed and
    /// [`BusFault::BusError`] when the slave answered `SLVERR` or `DECERR`.
    pub fn take_response(&mut self) -> Result<Response, TbError> {
        let (addr, resp) = self.completed.take().ok_or_else(|| TbError::Incomplete {
            agent: self.name.clone(),
        })?;
        if resp.is_error() {
            return Err(BusFault::BusError {
                channel: Channel::WriteResponse,
                addr,
                resp,
            }
            .into());
        }
        Ok(resp)
    }

    /// Writes `data` to `addr` with every byte lane enabled and waits for the
    /// response while stepping `peers`.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Busy`], [`TbError::Timeout`], errors raised by
    /// peers, or [`BusFault::BusError`] on an error response.
    pub fn write(
        &mut self,
        tb: &mut Testbench,
        peers: &mut [&mut dyn EdgeAgent],
        addr: u64,
        data: LogicValue,
    ) -> Result<Response, TbError> {
        self.submit(tb, peers, LiteWrite::new(addr, data))
    }

    /// Performs `request` and waits for the response while stepping `peers`.
    ///
    /// # Errors
    ///
    /// Same as [`LiteWriter::write`].
    pub fn submit(
        &mut self,
        tb: &mut Testbench,
        peers: &mut [&mut dyn EdgeAgent],
        request: LiteWrite,
    ) -> Result<Response, TbError> {
        self.begin_write(tb.bus_mut(), request)?;
        tb.run_until_done(self, peers)?;
        self.take_response()
    }
}

impl EdgeAgent for LiteWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
        match self.state {
            WriteState::Idle => Ok(Progress::Waiting),
            WriteState::Request {
                addr,
                mut aw_pending,
                mut w_pending,
            } => {
                if aw_pending && ctx.is_high(self.awvalid.id()) && ctx.is_high(self.awready) {
                    aw_pending = false;
                    ctx.drive(&self.awvalid, 0);
                    if ctx.tracing() {
                        ctx.emit(TraceEvent::Handshake {
                            edge: ctx.edge(),
                            agent: self.name.clone(),
                            channel: Channel::WriteAddress,
                            value: LogicValue::from(addr),
                        });
                    }
                }
                if w_pending && ctx.is_high(self.wvalid.id()) && ctx.is_high(self.wready) {
                    w_pending = false;
                    ctx.drive(&self.wvalid, 0);
                    if ctx.tracing() {
                        ctx.emit(TraceEvent::Handshake {
                            edge: ctx.edge(),
                            agent: self.name.clone(),
                            channel: Channel::WriteData,
                            value: ctx.get(self.wdata.id()),
                        });
                    }
                }

                self.state = if aw_pending || w_pending {
                    WriteState::Request {
                        addr,
                        aw_pending,
                        w_pending,
                    }
                } else {
                    ctx.drive(&self.bready, 1);
                    WriteState::Response { addr }
                };
                Ok(Progress::Waiting)
            }
            WriteState::Response { addr } => {
                if !(ctx.is_high(self.bready.id()) && ctx.is_high(self.bvalid)) {
                    return Ok(Progress::Waiting);
                }

                let resp = self
                    .bresp
                    .map_or(Response::Okay, |id| Response::from_bits(ctx.get(id)));
                ctx.drive(&self.bready, 0);
                if resp.is_error() {
                    warn!(agent = %self.name, addr, %resp, "lite write answered with error");
                } else {
                    debug!(agent = %self.name, addr, %resp, "lite write complete");
                }
                if ctx.tracing() {
                    ctx.emit(TraceEvent::TransactionCompleted {
                        edge: ctx.edge(),
                        agent: self.name.clone(),
                        direction: Direction::Write,
                        beats: 1,
                        resp,
                    });
                }

                self.completed = Some((addr, resp));
                self.state = WriteState::Idle;
                Ok(Progress::Complete)
            }
        }
    }
}
