use axi_agents::{
    DriveLine, EdgeAgent, EdgeContext, LogicValue, Progress, SignalAdapter, SignalError, TbError,
    Testbench,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{debug, trace};

/// Number of cycles a reset is held asserted.
pub const RESET_CYCLES: u32 = 5;

/// Level at which a reset input is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResetPolarity {
    /// Asserted at 1, e.g. `rst`.
    #[default]
    ActiveHigh,
    /// Asserted at 0, e.g. `rstn`.
    ActiveLow,
}

impl ResetPolarity {
    /// Level driven while the reset is asserted.
    #[must_use]
    pub const fn asserted(self) -> LogicValue {
        match self {
            Self::ActiveHigh => 1,
            Self::ActiveLow => 0,
        }
    }

    /// Level driven once the reset is released.
    #[must_use]
    pub const fn released(self) -> LogicValue {
        match self {
            Self::ActiveHigh => 0,
            Self::ActiveLow => 1,
        }
    }
}

fn claim(bus: &mut dyn SignalAdapter, name: &str) -> Result<DriveLine, SignalError> {
    let id = bus
        .lookup(name)
        .ok_or_else(|| SignalError::Unknown(name.to_string()))?;
    bus.claim(id)
}

/// Holds a reset signal asserted for [`RESET_CYCLES`] edges.
#[derive(Debug)]
pub struct ResetPulse {
    name: String,
    line: DriveLine,
    polarity: ResetPolarity,
    remaining: u32,
}

impl ResetPulse {
    /// Claims the reset signal `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the signal is missing or already driven.
    pub fn connect(
        bus: &mut dyn SignalAdapter,
        name: &str,
        polarity: ResetPolarity,
    ) -> Result<Self, SignalError> {
        Ok(Self {
            name: name.to_string(),
            line: claim(bus, name)?,
            polarity,
            remaining: 0,
        })
    }

    /// Returns `true` while the reset is asserted.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Asserts the reset; it is released after [`RESET_CYCLES`] edges.
    pub fn begin(&mut self, bus: &mut dyn SignalAdapter) {
        debug!(signal = %self.name, polarity = ?self.polarity, "reset asserted");
        bus.drive(&self.line, self.polarity.asserted());
        self.remaining = RESET_CYCLES;
    }

    /// Pulses the reset and returns once it is released, stepping `peers`
    /// meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Timeout`] or errors raised by peers.
    pub fn pulse(
        &mut self,
        tb: &mut Testbench,
        peers: &mut [&mut dyn EdgeAgent],
    ) -> Result<(), TbError> {
        self.begin(tb.bus_mut());
        tb.run_until_done(self, peers)?;
        Ok(())
    }
}

impl EdgeAgent for ResetPulse {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
        if self.remaining == 0 {
            return Ok(Progress::Waiting);
        }
        self.remaining -= 1;
        if self.remaining > 0 {
            return Ok(Progress::Waiting);
        }
        ctx.drive(&self.line, self.polarity.released());
        debug!(signal = %self.name, edge = ctx.edge(), "reset released");
        Ok(Progress::Complete)
    }
}

/// Flips a one-bit signal after random intervals, indefinitely.
#[derive(Debug)]
pub struct SignalToggler {
    name: String,
    line: DriveLine,
    min_cycles: u32,
    max_cycles: u32,
    rng: Xoshiro256StarStar,
    countdown: u32,
    toggles: u64,
}

impl SignalToggler {
    /// Shortest interval between flips.
    pub const DEFAULT_MIN_CYCLES: u32 = 1;
    /// Longest interval between flips.
    pub const DEFAULT_MAX_CYCLES: u32 = 25;

    /// Claims the signal `name` and schedules the first flip.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the signal is missing or already driven.
    pub fn connect(bus: &mut dyn SignalAdapter, name: &str, seed: u64) -> Result<Self, SignalError> {
        let mut toggler = Self {
            name: name.to_string(),
            line: claim(bus, name)?,
            min_cycles: Self::DEFAULT_MIN_CYCLES,
            max_cycles: Self::DEFAULT_MAX_CYCLES,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            countdown: 0,
            toggles: 0,
        };
        toggler.countdown = toggler.draw();
        Ok(toggler)
    }

    /// Draws intervals from `min..=max` cycles instead of the default range.
    #[must_use]
    pub fn with_interval(mut self, min: u32, max: u32) -> Self {
        self.min_cycles = min.max(1);
        self.max_cycles = max.max(self.min_cycles);
        self.countdown = self.draw();
        self
    }

    /// Number of flips driven so far.
    #[must_use]
    pub const fn toggles(&self) -> u64 {
        self.toggles
    }

    fn draw(&mut self) -> u32 {
        self.rng.gen_range(self.min_cycles..=self.max_cycles)
    }
}

impl EdgeAgent for SignalToggler {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            let next = LogicValue::from(!ctx.is_high(self.line.id()));
            ctx.drive(&self.line, next);
            self.toggles += 1;
            self.countdown = self.draw();
            trace!(signal = %self.name, edge = ctx.edge(), next, "signal toggled");
        }
        Ok(Progress::Waiting)
    }
}

#[cfg(test)]
mod tests {
    use axi_agents::{
        EdgeAgent, EdgeContext, Progress, SignalBank, SignalId, TbError, Testbench,
        TestbenchConfig,
    };
    use rstest::rstest;

    use super::{ResetPolarity, ResetPulse, SignalToggler, RESET_CYCLES};

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

    fn bench(signal: &str) -> (Testbench, Probe) {
        let mut bus = SignalBank::new();
        let id = bus.declare(signal, 1).expect("declare");
        (
            Testbench::new(bus, TestbenchConfig::default()),
            Probe {
                id,
                seen: Vec::new(),
            },
        )
    }

    #[rstest]
    #[case::rst("rst", ResetPolarity::ActiveHigh)]
    #[case::rstn("rstn", ResetPolarity::ActiveLow)]
    fn reset_is_held_for_five_edges(#[case] signal: &str, #[case] polarity: ResetPolarity) {
        let (mut tb, mut probe) = bench(signal);
        let mut reset = ResetPulse::connect(tb.bus_mut(), signal, polarity).expect("connect");

        reset.pulse(&mut tb, &mut [&mut probe]).expect("pulse");
        tb.edge(&mut [&mut probe]).expect("edge");

        let asserted = polarity.asserted();
        assert_eq!(probe.seen.len(), RESET_CYCLES as usize + 1);
        assert!(probe.seen[..RESET_CYCLES as usize]
            .iter()
            .all(|value| *value == asserted));
        assert_eq!(probe.seen.last(), Some(&polarity.released()));
        assert!(!reset.is_active());
    }

    #[test]
    fn second_driver_is_refused() {
        let (mut tb, _) = bench("rst");
        let _reset = ResetPulse::connect(tb.bus_mut(), "rst", ResetPolarity::ActiveHigh)
            .expect("connect");

        assert!(SignalToggler::connect(tb.bus_mut(), "rst", 1).is_err());
    }

    #[test]
    fn toggler_flips_within_interval_bounds() {
        let (mut tb, mut probe) = bench("pause");
        let mut toggler = SignalToggler::connect(tb.bus_mut(), "pause", 9)
            .expect("connect")
            .with_interval(2, 4);

        tb.run_cycles(200, &mut [&mut toggler, &mut probe])
            .expect("run");

        let flips: Vec<_> = probe
            .seen
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| pair[0] != pair[1])
            .map(|(index, _)| index)
            .collect();
        assert!(flips.len() >= 40);
        assert!(flips.windows(2).all(|pair| (2..=4).contains(&(pair[1] - pair[0]))));
        assert!(toggler.toggles() >= 40);
    }
}
