use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{debug, trace};

use super::{StreamConfig, StreamFrame};
use crate::{
    width_mask, Channel, DriveLine, EdgeAgent, EdgeContext, LogicValue, Progress, SignalAdapter,
    SignalError, SignalId, TbError, Testbench, TraceEvent,
};

/// Idle-gap probability used by the reference stream driver.
pub const REFERENCE_GAP_PERCENT: u8 = 20;

/// Writer pacing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StreamWriterConfig {
    /// Chance in percent of lowering `TVALID` for one cycle after an accepted
    /// non-final word.
    pub gap_percent: u8,
    /// Seed for the gap generator.
    pub seed: u64,
}

impl StreamWriterConfig {
    /// Inserts idle gaps with the reference 20% probability.
    #[must_use]
    pub const fn with_random_gaps(seed: u64) -> Self {
        Self {
            gap_percent: REFERENCE_GAP_PERCENT,
            seed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Presenting { index: usize },
    Gap { next: usize },
}

/// AXI4-Stream master-side transactor.
#[derive(Debug)]
pub struct StreamWriter {
    name: String,
    tdata: DriveLine,
    tvalid: DriveLine,
    tlast: DriveLine,
    tkeep: Option<DriveLine>,
    tuser: Option<DriveLine>,
    tready: Option<SignalId>,
    full_keep: LogicValue,
    config: StreamWriterConfig,
    rng: Xoshiro256StarStar,
    queue: VecDeque<StreamFrame>,
    state: WriterState,
    sent_frames: u64,
}

impl StreamWriter {
    /// Resolves the stream signals and claims the master-side ones.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when `tdata`, `tvalid` or `tlast` is missing
    /// or any claimed signal already has a driver.
    pub fn connect(
        bus: &mut dyn SignalAdapter,
        stream: &StreamConfig,
        config: StreamWriterConfig,
    ) -> Result<Self, SignalError> {
        let ports = stream.ports();
        let tkeep = ports.claim_optional(bus, "tkeep")?;
        let full_keep = tkeep
            .as_ref()
            .map_or(0, |line| width_mask(bus.width(line.id())));

        Ok(Self {
            name: format!("{}.writer", ports.prefix()),
            tdata: ports.claim(bus, "tdata")?,
            tvalid: ports.claim(bus, "tvalid")?,
            tlast: ports.claim(bus, "tlast")?,
            tkeep,
            tuser: ports.claim_optional(bus, "tuser")?,
            tready: ports.optional(bus, "tready"),
            full_keep,
            config,
            rng: Xoshiro256StarStar::seed_from_u64(config.seed),
            queue: VecDeque::new(),
            state: WriterState::Idle,
            sent_frames: 0,
        })
    }

    /// Returns `true` when no frame is queued or in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of frames whose final word was accepted.
    #[must_use]
    pub const fn sent_frames(&self) -> u64 {
        self.sent_frames
    }

    /// Drives idle values and drops queued frames.
    pub fn reset(&mut self, bus: &mut dyn SignalAdapter) {
        bus.drive(&self.tdata, 0);
        bus.drive(&self.tvalid, 0);
        bus.drive(&self.tlast, 0);
        if let Some(tkeep) = &self.tkeep {
            bus.drive(tkeep, 0);
        }
        if let Some(tuser) = &self.tuser {
            bus.drive(tuser, 0);
        }
        self.queue.clear();
        self.state = WriterState::Idle;
    }

    /// Queues a frame; presentation starts immediately when the writer is
    /// idle.
    pub fn begin_send(&mut self, bus: &mut dyn SignalAdapter, frame: StreamFrame) {
        debug!(agent = %self.name, beats = frame.beats(), "stream frame queued");
        self.queue.push_back(frame);
        if self.state == WriterState::Idle {
            self.present(bus, 0);
        }
    }

    /// Sends `frame` and returns once its final word has been accepted,
    /// stepping `peers` meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`TbError::Timeout`] or errors raised by peers.
    pub fn send(
        &mut self,
        tb: &mut Testbench,
        peers: &mut [&mut dyn EdgeAgent],
        frame: StreamFrame,
    ) -> Result<(), TbError> {
        self.begin_send(tb.bus_mut(), frame);
        while !self.is_idle() {
            tb.run_until_done(self, peers)?;
        }
        Ok(())
    }

    fn present(&mut self, bus: &mut dyn SignalAdapter, index: usize) {
        let Some(frame) = self.queue.front() else {
            self.state = WriterState::Idle;
            return;
        };

        bus.drive(&self.tdata, frame.data()[index]);
        bus.drive(&self.tvalid, 1);
        bus.drive(&self.tlast, LogicValue::from(frame.is_last(index)));
        if let Some(tkeep) = &self.tkeep {
            bus.drive(tkeep, frame.keep_at(index, self.full_keep));
        }
        if let Some(tuser) = &self.tuser {
            bus.drive(tuser, frame.user_at(index));
        }
        self.state = WriterState::Presenting { index };
    }

    fn go_idle(&mut self, bus: &mut dyn SignalAdapter) {
        bus.drive(&self.tvalid, 0);
        bus.drive(&self.tlast, 0);
        self.state = WriterState::Idle;
    }

    fn roll_gap(&mut self) -> bool {
        self.config.gap_percent > 0 && self.rng.gen_range(0..100u8) < self.config.gap_percent
    }
}

impl EdgeAgent for StreamWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
        match self.state {
            WriterState::Idle => Ok(Progress::Waiting),
            WriterState::Gap { next } => {
                self.present(ctx.bus(), next);
                Ok(Progress::Waiting)
            }
            WriterState::Presenting { index } => {
                let ready = self.tready.is_none_or(|id| ctx.is_high(id));
                if !(ready && ctx.is_high(self.tvalid.id())) {
                    return Ok(Progress::Waiting);
                }

                if ctx.tracing() {
                    ctx.emit(TraceEvent::Handshake {
                        edge: ctx.edge(),
                        agent: self.name.clone(),
                        channel: Channel::Stream,
                        value: ctx.get(self.tdata.id()),
                    });
                }

                let last = self.queue.front().is_none_or(|frame| frame.is_last(index));
                if !last {
                    if self.roll_gap() {
                        trace!(agent = %self.name, index, "idle gap");
                        ctx.drive(&self.tvalid, 0);
                        self.state = WriterState::Gap { next: index + 1 };
                    } else {
                        self.present(ctx.bus(), index + 1);
                    }
                    return Ok(Progress::Waiting);
                }

                let beats = self.queue.pop_front().as_ref().map_or(0, StreamFrame::beats);
                self.sent_frames += 1;
                debug!(agent = %self.name, beats, "stream frame sent");
                if ctx.tracing() {
                    ctx.emit(TraceEvent::FrameCompleted {
                        edge: ctx.edge(),
                        agent: self.name.clone(),
                        beats,
                    });
                }

                if self.queue.is_empty() {
                    self.go_idle(ctx.bus());
                } else {
                    self.present(ctx.bus(), 0);
                }
                Ok(Progress::Complete)
            }
        }
    }
}
