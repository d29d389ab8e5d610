//! Edge scheduler that steps agents against a shared signal bank.
//!
//! Every agent is sampled against the same committed snapshot on each rising
//! edge. Drives issued during an edge, or between edges by host code, are
//! committed before the next edge is delivered.

use tracing::{trace, warn};

use crate::{
    DriveLine, LogicValue, SignalAdapter, SignalBank, SignalId, TbError, TraceEvent,
    TraceRecorder, TraceSink,
};

/// Default clock period: 100 MHz.
pub const DEFAULT_CLOCK_PERIOD_PS: u64 = 10_000;

/// Default wait budget for blocking helpers.
pub const DEFAULT_MAX_WAIT_EDGES: u64 = 100_000;

/// Completion status reported by an agent after an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progress {
    /// The agent is idle or still waiting on a handshake.
    Waiting,
    /// The agent finished its current operation on this edge.
    Complete,
}

/// Cycle-stepped agent driven by the scheduler.
pub trait EdgeAgent {
    /// Instance name used in traces and errors.
    fn name(&self) -> &str;

    /// Samples the committed snapshot and schedules drives for the next edge.
    ///
    /// # Errors
    ///
    /// Returns [`TbError`] when the agent detects a fault it must raise.
    fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError>;
}

/// Per-edge view handed to agents.
pub struct EdgeContext<'a> {
    edge: u64,
    bus: &'a mut dyn SignalAdapter,
    trace: &'a mut TraceRecorder,
}

impl<'a> EdgeContext<'a> {
    /// Creates a context for one edge.
    pub fn new(edge: u64, bus: &'a mut dyn SignalAdapter, trace: &'a mut TraceRecorder) -> Self {
        Self { edge, bus, trace }
    }

    /// Index of the current edge, starting at 1.
    #[must_use]
    pub const fn edge(&self) -> u64 {
        self.edge
    }

    /// Samples a committed value.
    #[must_use]
    pub fn get(&self, id: SignalId) -> LogicValue {
        self.bus.get(id)
    }

    /// Samples a committed 1-bit value.
    #[must_use]
    pub fn is_high(&self, id: SignalId) -> bool {
        self.bus.get(id) != 0
    }

    /// Schedules a drive for the next edge.
    pub fn drive(&mut self, line: &DriveLine, value: LogicValue) {
        self.bus.drive(line, value);
    }

    /// Returns the underlying adapter.
    pub fn bus(&mut self) -> &mut dyn SignalAdapter {
        &mut *self.bus
    }

    /// Returns `true` when emitted events are retained.
    #[must_use]
    pub const fn tracing(&self) -> bool {
        self.trace.is_enabled()
    }

    /// Records a trace event.
    pub fn emit(&mut self, event: TraceEvent) {
        self.trace.on_event(event);
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TestbenchConfig {
    /// Clock period used to convert edges into simulated time.
    pub clock_period_ps: u64,
    /// Budget for `run_until*`; `None` waits forever.
    pub max_wait_edges: Option<u64>,
    /// Retain trace events emitted by agents.
    pub record_trace: bool,
}

impl Default for TestbenchConfig {
    fn default() -> Self {
        Self {
            clock_period_ps: DEFAULT_CLOCK_PERIOD_PS,
            max_wait_edges: Some(DEFAULT_MAX_WAIT_EDGES),
            record_trace: false,
        }
    }
}

impl TestbenchConfig {
    /// Sets the clock period from a frequency in MHz.
    #[must_use]
    pub const fn with_clock_mhz(mut self, mhz: u64) -> Self {
        if mhz > 0 {
            self.clock_period_ps = 1_000_000 / mhz;
        }
        self
    }

    /// Sets the wait budget.
    #[must_use]
    pub const fn with_max_wait_edges(mut self, edges: Option<u64>) -> Self {
        self.max_wait_edges = edges;
        self
    }

    /// Enables trace recording.
    #[must_use]
    pub const fn with_trace(mut self) -> Self {
        self.record_trace = true;
        self
    }
}

/// Owns the signal bank and delivers clock edges to agents.
#[derive(Debug, Clone)]
pub struct Testbench {
    bus: SignalBank,
    config: TestbenchConfig,
    edges: u64,
    trace: TraceRecorder,
}

impl Testbench {
    /// Wraps a populated signal bank.
    #[must_use]
    pub const fn new(bus: SignalBank, config: TestbenchConfig) -> Self {
        Self {
            bus,
            config,
            edges: 0,
            trace: TraceRecorder::new(config.record_trace),
        }
    }

    /// Returns the signal bank.
    #[must_use]
    pub const fn bus(&self) -> &SignalBank {
        &self.bus
    }

    /// Returns the signal bank for host-side drives and agent construction.
    pub const fn bus_mut(&mut self) -> &mut SignalBank {
        &mut self.bus
    }

    /// Returns the scheduler configuration.
    #[must_use]
    pub const fn config(&self) -> &TestbenchConfig {
        &self.config
    }

    /// Number of edges delivered so far.
    #[must_use]
    pub const fn edges(&self) -> u64 {
        self.edges
    }

    /// Simulated time in picoseconds.
    #[must_use]
    pub const fn sim_time_ps(&self) -> u64 {
        self.edges.saturating_mul(self.config.clock_period_ps)
    }

    /// Returns the trace recorder.
    #[must_use]
    pub const fn trace(&self) -> &TraceRecorder {
        &self.trace
    }

    /// Returns the trace recorder mutably, e.g. to drain it.
    pub const fn trace_mut(&mut self) -> &mut TraceRecorder {
        &mut self.trace
    }

    /// Delivers one rising edge to every agent.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by an agent.
    pub fn edge(&mut self, agents: &mut [&mut dyn EdgeAgent]) -> Result<(), TbError> {
        self.step(None, agents).map(|_| ())
    }

    /// Delivers `cycles` edges.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by an agent.
    pub fn run_cycles(
        &mut self,
        cycles: u64,
        agents: &mut [&mut dyn EdgeAgent],
    ) -> Result<(), TbError> {
        for _ in 0..cycles {
            self.step(None, agents)?;
        }
        Ok(())
    }

    /// Delivers edges until `condition` holds on the committed snapshot and
    /// returns the number of edges spent.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Timeout`] when the wait budget runs out, or the
    /// first error raised by an agent.
    pub fn run_until<F>(
        &mut self,
        mut condition: F,
        agents: &mut [&mut dyn EdgeAgent],
    ) -> Result<u64, TbError>
    where
        F: FnMut(&SignalBank) -> bool,
    {
        let mut waited = 0;
        loop {
            self.bus.commit();
            if condition(&self.bus) {
                return Ok(waited);
            }
            self.check_budget(waited)?;
            self.step(None, agents)?;
            waited += 1;
        }
    }

    /// Delivers edges until `primary` reports [`Progress::Complete`] and
    /// returns the number of edges spent.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Timeout`] when the wait budget runs out, or the
    /// first error raised by any agent.
    pub fn run_until_done(
        &mut self,
        primary: &mut dyn EdgeAgent,
        peers: &mut [&mut dyn EdgeAgent],
    ) -> Result<u64, TbError> {
        let mut waited = 0;
        loop {
            self.check_budget(waited)?;
            let progress = self.step(Some(&mut *primary), peers)?;
            waited += 1;
            if progress == Progress::Complete {
                trace!(agent = primary.name(), waited, "operation complete");
                return Ok(waited);
            }
        }
    }

    fn check_budget(&self, waited: u64) -> Result<(), TbError> {
        match self.config.max_wait_edges {
            Some(budget) if waited >= budget => {
                warn!(edge = self.edges, budget, "wait budget exhausted");
                Err(TbError::Timeout { edges: waited })
            }
            _ => Ok(()),
        }
    }

    fn step(
        &mut self,
        primary: Option<&mut dyn EdgeAgent>,
        peers: &mut [&mut dyn EdgeAgent],
    ) -> Result<Progress, TbError> {
        self.bus.commit();
        self.edges += 1;

        let mut ctx = EdgeContext::new(self.edges, &mut self.bus, &mut self.trace);
        let mut outcome = primary.map_or(Ok(Progress::Waiting), |agent| agent.on_edge(&mut ctx));
        // Every agent sees the edge even after one fails; the first error wins.
        for peer in peers.iter_mut() {
            if let Err(err) = peer.on_edge(&mut ctx) {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }

        let changed = self.bus.commit();
        trace!(edge = self.edges, changed, "edge delivered");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::{EdgeAgent, EdgeContext, Progress, Testbench, TestbenchConfig};
    use crate::{DriveLine, SignalAdapter, SignalBank, SignalId, TbError};

    /// Drives a counter and completes after `target` edges.
    struct Counter {
        line: DriveLine,
        count: u128,
        target: u128,
    }

    impl EdgeAgent for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
            self.count += 1;
            ctx.drive(&self.line, self.count);
            if self.count >= self.target {
                Ok(Progress::Complete)
            } else {
                Ok(Progress::Waiting)
            }
        }
    }

    /// Records what it sampled from a signal on each edge.
    struct Probe {
        id: SignalId,
        seen: Vec<u128>,
    }

    impl EdgeAgent for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
            self.seen.push(ctx.get(self.id));
            Ok(Progress::Waiting)
        }
    }

    fn bench(target: u128, config: TestbenchConfig) -> (Testbench, Counter, Probe) {
        let mut bus = SignalBank::new();
        let id = bus.declare("count", 8).expect("declare");
        let line = bus.claim(id).expect("claim");
        (
            Testbench::new(bus, config),
            Counter {
                line,
                count: 0,
                target,
            },
            Probe {
                id,
                seen: Vec::new(),
            },
        )
    }

    #[test]
    fn drives_become_visible_on_the_next_edge() {
        let (mut tb, mut counter, mut probe) = bench(10, TestbenchConfig::default());

        tb.run_cycles(3, &mut [&mut counter, &mut probe])
            .expect("run");

        assert_eq!(probe.seen, vec![0, 1, 2]);
        assert_eq!(tb.bus().get(probe.id), 3);
        assert_eq!(tb.edges(), 3);
        assert_eq!(tb.sim_time_ps(), 30_000);
    }

    #[test]
    fn run_until_done_counts_edges() {
        let (mut tb, mut counter, mut probe) = bench(4, TestbenchConfig::default());

        let waited = tb
            .run_until_done(&mut counter, &mut [&mut probe])
            .expect("counter completes");

        assert_eq!(waited, 4);
    }

    #[test]
    fn run_until_observes_committed_snapshot() {
        let (mut tb, mut counter, _) = bench(100, TestbenchConfig::default());
        let id = tb.bus().resolve("count").expect("declared");

        let waited = tb
            .run_until(|bus| bus.get(id) == 5, &mut [&mut counter])
            .expect("condition reached");

        assert_eq!(waited, 5);
    }

    #[test]
    fn exhausted_budget_times_out() {
        let config = TestbenchConfig::default().with_max_wait_edges(Some(3));
        let (mut tb, mut counter, _) = bench(100, config);

        assert_eq!(
            tb.run_until_done(&mut counter, &mut []),
            Err(TbError::Timeout { edges: 3 })
        );
    }

    /// Fails on every edge with a fixed error.
    struct Failing(TbError);

    impl EdgeAgent for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_edge(&mut self, _ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
            Err(self.0.clone())
        }
    }

    #[test]
    fn failing_agent_does_not_cut_the_edge_short() {
        let (mut tb, mut counter, mut probe) = bench(10, TestbenchConfig::default());
        let mut first = Failing(TbError::Busy {
            agent: "first".to_string(),
        });
        let mut second = Failing(TbError::Incomplete {
            agent: "second".to_string(),
        });

        let err = tb
            .edge(&mut [&mut first, &mut counter, &mut second, &mut probe])
            .expect_err("agent failed");

        assert_eq!(
            err,
            TbError::Busy {
                agent: "first".to_string(),
            }
        );
        assert_eq!(probe.seen, vec![0]);
        assert_eq!(tb.bus().get(probe.id), 1);
        assert!(!tb.bus().has_pending());
    }

    #[test]
    fn clock_frequency_sets_period() {
        let config = TestbenchConfig::default().with_clock_mhz(250);
        assert_eq!(config.clock_period_ps, 4_000);
    }
}
