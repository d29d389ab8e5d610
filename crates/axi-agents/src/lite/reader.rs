use tracing::{debug, warn};

use super::{LiteConfig, LiteReadResult};
use crate::{
    BusFault, Channel, Direction, DriveLine, EdgeAgent, EdgeContext, LogicValue, Progress,
    Response, SignalAdapter, SignalError, SignalId, TbError, Testbench, TraceEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Idle,
    Address { addr: u64 },
    Data { addr: u64 },
}

/// AXI4-Lite read transactor.
#[derive(Debug)]
pub struct LiteReader {
    name: String,
    araddr: DriveLine,
    arvalid: DriveLine,
    rready: DriveLine,
    arready: SignalId,
    rvalid: SignalId,
    rdata: SignalId,
    rresp: Option<SignalId>,
    state: ReadState,
    completed: Option<(u64, LiteReadResult)>,
}

impl LiteReader {
    /// Resolves the read channels and claims their master-side signals.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when a mandatory signal is missing or already
    /// driven by another agent.
    pub fn connect(bus: &mut dyn SignalAdapter, config: &LiteConfig) -> Result<Self, SignalError> {
        let ports = config.ports();
        Ok(Self {
            name: format!("{}.read", ports.prefix()),
            araddr: ports.claim(bus, "araddr")?,
            arvalid: ports.claim(bus, "arvalid")?,
            rready: ports.claim(bus, "rready")?,
            arready: ports.required(bus, "arready")?,
            rvalid: ports.required(bus, "rvalid")?,
            rdata: ports.required(bus, "rdata")?,
            rresp: ports.optional(bus, "rresp"),
            state: ReadState::Idle,
            completed: None,
        })
    }

    /// Returns `true` while a read is outstanding.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        !matches!(self.state, ReadState::Idle)
    }

    /// Drives idle values and abandons any outstanding read.
    pub fn reset(&mut self, bus: &mut dyn SignalAdapter) {
        bus.drive(&self.arvalid, 0);
        bus.drive(&self.rready, 0);
        self.state = ReadState::Idle;
        self.completed = None;
    }

    /// Presents a read on the address channel.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Busy`] when a read is already outstanding.
    pub fn begin_read(&mut self, bus: &mut dyn SignalAdapter, addr: u64) -> Result<(), TbError> {
        if self.is_busy() {
            return Err(TbError::Busy {
                agent: self.name.clone(),
            });
        }

        bus.drive(&self.araddr, LogicValue::from(addr));
        bus.drive(&self.arvalid, 1);
        bus.drive(&self.rready, 1);

        debug!(agent = %self.name, addr, "lite read issued");
        self.completed = None;
        self.state = ReadState::Address { addr };
        Ok(())
    }

    /// Takes the result of the last completed read.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Incomplete`] when no read has completed and
    /// [`BusFault::BusError`] when the slave answered `SLVERR` or `DECERR`.
    pub fn take_result(&mut self) -> Result<LiteReadResult, TbError> {
        let (addr, result) = self.completed.take().ok_or_else(|| TbError::Incomplete {
            agent: self.name.clone(),
        })?;
        if result.resp.is_error() {
            return Err(BusFault::BusError {
                channel: Channel::ReadData,
                addr,
                resp: result.resp,
            }
            .into());
        }
        Ok(result)
    }

    /// Reads `addr` and waits for the data while stepping `peers`.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Busy`], [`TbError::Timeout`], errors raised by
    /// peers, or [`BusFault::BusError`] on an error response.
    pub fn read(
        &mut self,
        tb: &mut Testbench,
        peers: &mut [&mut dyn EdgeAgent],
        addr: u64,
    ) -> Result<LiteReadResult, TbError> {
        self.begin_read(tb.bus_mut(), addr)?;
        tb.run_until_done(self, peers)?;
        self.take_result()
    }
}

impl EdgeAgent for LiteReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
        match self.state {
            ReadState::Idle => Ok(Progress::Waiting),
            ReadState::Address { addr } => {
                if ctx.is_high(self.arvalid.id()) && ctx.is_high(self.arready) {
                    ctx.drive(&self.arvalid, 0);
                    if ctx.tracing() {
                        ctx.emit(TraceEvent::Handshake {
                            edge: ctx.edge(),
                            agent: self.name.clone(),
                            channel: Channel::ReadAddress,
                            value: LogicValue::from(addr),
                        });
                    }
                    self.state = ReadState::Data { addr };
                }
                Ok(Progress::Waiting)
            }
            ReadState::Data { addr } => {
                if !(ctx.is_high(self.rready.id()) && ctx.is_high(self.rvalid)) {
                    return Ok(Progress::Waiting);
                }

                let result = LiteReadResult {
                    data: ctx.get(self.rdata),
                    resp: self
                        .rresp
                        .map_or(Response::Okay, |id| Response::from_bits(ctx.get(id))),
                };
                ctx.drive(&self.rready, 0);
                if result.resp.is_error() {
                    warn!(agent = %self.name, addr, resp = %result.resp, "lite read answered with error");
                } else {
                    debug!(agent = %self.name, addr, data = %result.data, "lite read complete");
                }
                if ctx.tracing() {
                    ctx.emit(TraceEvent::TransactionCompleted {
                        edge: ctx.edge(),
                        agent: self.name.clone(),
                        direction: Direction::Read,
                        beats: 1,
                        resp: result.resp,
                    });
                }

                self.completed = Some((addr, result));
                self.state = ReadState::Idle;
                Ok(Progress::Complete)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LiteReader;
    use crate::{
        DriveLine, EdgeAgent, EdgeContext, LiteConfig, LiteReadResult, Progress, Response,
        SignalBank, SignalError, SignalId, TbError, Testbench, TestbenchConfig,
    };

    /// Answers every read one edge after the address handshake with the
    /// address echoed back as data.
    struct EchoSlave {
        araddr: SignalId,
        arvalid: SignalId,
        arready: DriveLine,
        rvalid: DriveLine,
        rdata: DriveLine,
        pending: bool,
    }

    impl EdgeAgent for EchoSlave {
        fn name(&self) -> &str {
            "echo"
        }

        fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
            if ctx.is_high(self.arvalid) && ctx.is_high(self.arready.id()) {
                ctx.drive(&self.rdata, ctx.get(self.araddr) ^ 0xFF);
                self.pending = true;
            }
            ctx.drive(&self.arready, 1);
            ctx.drive(&self.rvalid, u128::from(self.pending));
            Ok(Progress::Waiting)
        }
    }

    fn bench() -> (Testbench, LiteReader, EchoSlave) {
        let mut bus = SignalBank::new();
        for (name, width) in [
            ("s_axi_regs_araddr", 16),
            ("s_axi_regs_arvalid", 1),
            ("s_axi_regs_arready", 1),
            ("s_axi_regs_rdata", 32),
            ("s_axi_regs_rvalid", 1),
            ("s_axi_regs_rready", 1),
        ] {
            bus.declare(name, width).expect("declare");
        }

        let reader =
            LiteReader::connect(&mut bus, &LiteConfig::for_instance("regs")).expect("connect");
        let slave = EchoSlave {
            araddr: bus.resolve("s_axi_regs_araddr").expect("declared"),
            arvalid: bus.resolve("s_axi_regs_arvalid").expect("declared"),
            arready: bus.claim_named("s_axi_regs_arready").expect("claim"),
            rvalid: bus.claim_named("s_axi_regs_rvalid").expect("claim"),
            rdata: bus.claim_named("s_axi_regs_rdata").expect("claim"),
            pending: false,
        };
        (Testbench::new(bus, TestbenchConfig::default()), reader, slave)
    }

    #[test]
    fn read_returns_sampled_data_and_okay_without_rresp() {
        let (mut tb, mut reader, mut slave) = bench();

        let result = reader
            .read(&mut tb, &mut [&mut slave], 0x40)
            .expect("read completes");

        assert_eq!(
            result,
            LiteReadResult {
                data: 0x40 ^ 0xFF,
                resp: Response::Okay,
            }
        );
        assert!(!reader.is_busy());
    }

    #[test]
    fn connect_fails_when_signal_is_already_driven() {
        let (mut tb, _reader, _) = bench();
        let err = LiteReader::connect(tb.bus_mut(), &LiteConfig::for_instance("regs"))
            .expect_err("arvalid already claimed");
        assert_eq!(
            err,
            SignalError::AlreadyDriven("s_axi_regs_araddr".to_string())
        );
    }

    #[test]
    fn reset_releases_busy_state() {
        let (mut tb, mut reader, _) = bench();
        reader.begin_read(tb.bus_mut(), 0x4).expect("begin");
        assert!(matches!(
            reader.begin_read(tb.bus_mut(), 0x8),
            Err(TbError::Busy { .. })
        ));

        reader.reset(tb.bus_mut());
        assert!(reader.begin_read(tb.bus_mut(), 0x8).is_ok());
    }
}
