use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{debug, warn};

use super::{StreamConfig, StreamFrame};
use crate::{
    width_mask, BusFault, Channel, DriveLine, EdgeAgent, EdgeContext, LogicValue, Progress,
    SignalAdapter, SignalError, SignalId, TbError, Testbench, TraceEvent,
};

/// How the reader drives `TREADY`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ReadyPolicy {
    /// Ready on every edge.
    #[default]
    Always,
    /// Ready while fewer than `max_buffered_beats` words of completed
    /// frames await collection. The frame being captured is not counted, so
    /// a frame longer than the limit still completes.
    WhenCapacity {
        /// Word limit over completed, uncollected frames.
        max_buffered_beats: usize,
    },
    /// Cycles through the pattern, one entry per edge. An empty pattern is
    /// always ready.
    Pattern(Vec<bool>),
    /// Stalls with the given chance on each edge.
    Random {
        /// Chance in percent of deasserting `TREADY`.
        stall_percent: u8,
        /// Seed for the stall generator.
        seed: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Beat {
    data: LogicValue,
    last: bool,
    keep: Option<LogicValue>,
    user: Option<LogicValue>,
}

/// AXI4-Stream slave-side transactor with continuous capture.
#[derive(Debug)]
pub struct StreamReader {
    name: String,
    tdata: SignalId,
    tvalid: SignalId,
    tlast: SignalId,
    tkeep: Option<SignalId>,
    tuser: Option<SignalId>,
    tready: Option<DriveLine>,
    full_keep: LogicValue,
    policy: ReadyPolicy,
    rng: Xoshiro256StarStar,
    pattern_pos: usize,
    stalled: Option<Beat>,
    current: Vec<LogicValue>,
    current_user: Vec<LogicValue>,
    completed: VecDeque<StreamFrame>,
}

impl StreamReader {
    /// Resolves the stream signals and claims `TREADY` when present.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when `tdata`, `tvalid` or `tlast` is missing
    /// or `tready` already has a driver.
    pub fn connect(
        bus: &mut dyn SignalAdapter,
        stream: &StreamConfig,
        policy: ReadyPolicy,
    ) -> Result<Self, SignalError> {
        let ports = stream.ports();
        let tkeep = ports.optional(bus, "tkeep");
        let seed = match policy {
            ReadyPolicy::Random { seed, .. } => seed,
            _ => 0,
        };

        Ok(Self {
            name: format!("{}.reader", ports.prefix()),
            tdata: ports.required(bus, "tdata")?,
            tvalid: ports.required(bus, "tvalid")?,
            tlast: ports.required(bus, "tlast")?,
            tkeep,
            tuser: ports.optional(bus, "tuser"),
            tready: ports.claim_optional(bus, "tready")?,
            full_keep: tkeep.map_or(0, |id| width_mask(bus.width(id))),
            policy,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            pattern_pos: 0,
            stalled: None,
            current: Vec::new(),
            current_user: Vec::new(),
            completed: VecDeque::new(),
        })
    }

    /// Drives `TREADY` low and discards any partially captured frame.
    pub fn reset(&mut self, bus: &mut dyn SignalAdapter) {
        if let Some(tready) = &self.tready {
            bus.drive(tready, 0);
        }
        self.stalled = None;
        self.current.clear();
        self.current_user.clear();
    }

    /// Applies the ready policy for the next edge without waiting for one.
    pub fn arm(&mut self, bus: &mut dyn SignalAdapter) {
        let ready = self.next_ready();
        if let Some(tready) = &self.tready {
            bus.drive(tready, LogicValue::from(ready));
        }
    }

    /// Number of completed frames awaiting collection.
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.completed.len()
    }

    /// Takes the oldest completed frame.
    pub fn take_frame(&mut self) -> Option<StreamFrame> {
        self.completed.pop_front()
    }

    /// Drains completed frames in capture order.
    pub fn frames(&mut self) -> FrameCapture<'_> {
        FrameCapture { reader: self }
    }

    /// Returns the next completed frame, stepping `peers` until one ends.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::ProtocolViolation`] when the writer breaks a
    /// stream rule, [`TbError::Timeout`], or errors raised by peers.
    pub fn receive(
        &mut self,
        tb: &mut Testbench,
        peers: &mut [&mut dyn EdgeAgent],
    ) -> Result<StreamFrame, TbError> {
        if self.completed.is_empty() {
            self.arm(tb.bus_mut());
        }
        loop {
            if let Some(frame) = self.completed.pop_front() {
                return Ok(frame);
            }
            tb.run_until_done(self, peers)?;
        }
    }

    fn buffered_beats(&self) -> usize {
        self.completed.iter().map(StreamFrame::beats).sum()
    }

    fn next_ready(&mut self) -> bool {
        match &self.policy {
            ReadyPolicy::Always => true,
            ReadyPolicy::WhenCapacity { max_buffered_beats } => {
                self.buffered_beats() < *max_buffered_beats
            }
            ReadyPolicy::Pattern(pattern) => {
                if pattern.is_empty() {
                    return true;
                }
                let ready = pattern[self.pattern_pos % pattern.len()];
                self.pattern_pos = self.pattern_pos.wrapping_add(1);
                ready
            }
            ReadyPolicy::Random { stall_percent, .. } => {
                let stall_percent = *stall_percent;
                self.rng.gen_range(0..100u8) >= stall_percent
            }
        }
    }

    fn sample(&self, ctx: &EdgeContext<'_>) -> Beat {
        Beat {
            data: ctx.get(self.tdata),
            last: ctx.is_high(self.tlast),
            keep: self.tkeep.map(|id| ctx.get(id)),
            user: self.tuser.map(|id| ctx.get(id)),
        }
    }

    fn violation(&self, ctx: &mut EdgeContext<'_>, detail: String) -> TbError {
        let fault = BusFault::ProtocolViolation {
            channel: Channel::Stream,
            detail,
        };
        warn!(agent = %self.name, edge = ctx.edge(), %fault, "stream protocol violation");
        if ctx.tracing() {
            ctx.emit(TraceEvent::Fault {
                edge: ctx.edge(),
                agent: self.name.clone(),
                fault: fault.clone(),
            });
        }
        fault.into()
    }

    fn accept(&mut self, ctx: &mut EdgeContext<'_>, beat: Beat) -> Result<Progress, TbError> {
        if ctx.tracing() {
            ctx.emit(TraceEvent::Handshake {
                edge: ctx.edge(),
                agent: self.name.clone(),
                channel: Channel::Stream,
                value: beat.data,
            });
        }

        if !beat.last {
            if let Some(keep) = beat.keep.filter(|keep| *keep != self.full_keep) {
                return Err(self.violation(
                    ctx,
                    format!("partial TKEEP {keep:#x} on non-final word"),
                ));
            }
        }

        self.current.push(beat.data);
        if let Some(user) = beat.user {
            self.current_user.push(user);
        }
        if !beat.last {
            return Ok(Progress::Waiting);
        }

        let last_keep = beat.keep.filter(|keep| *keep != self.full_keep);
        let frame = StreamFrame::assemble(
            std::mem::take(&mut self.current),
            last_keep,
            std::mem::take(&mut self.current_user),
        );
        debug!(agent = %self.name, beats = frame.beats(), "stream frame captured");
        if ctx.tracing() {
            ctx.emit(TraceEvent::FrameCompleted {
                edge: ctx.edge(),
                agent: self.name.clone(),
                beats: frame.beats(),
            });
        }
        self.completed.push_back(frame);
        Ok(Progress::Complete)
    }
}

impl EdgeAgent for StreamReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_edge(&mut self, ctx: &mut EdgeContext<'_>) -> Result<Progress, TbError> {
        let ready = self.tready.as_ref().is_none_or(|line| ctx.is_high(line.id()));
        let valid = ctx.is_high(self.tvalid);
        let beat = self.sample(ctx);

        if let Some(held) = self.stalled {
            if !valid {
                self.stalled = None;
                return Err(self.violation(ctx, "TVALID withdrawn while stalled".to_string()));
            }
            if held != beat {
                self.stalled = None;
                return Err(self.violation(ctx, "payload changed while stalled".to_string()));
            }
        }

        let progress = if valid && ready {
            self.stalled = None;
            self.accept(ctx, beat)?
        } else {
            self.stalled = valid.then_some(beat);
            Progress::Waiting
        };

        let next_ready = self.next_ready();
        if let Some(tready) = &self.tready {
            ctx.drive(tready, LogicValue::from(next_ready));
        }
        Ok(progress)
    }
}

/// Draining iterator over completed frames.
#[derive(Debug)]
pub struct FrameCapture<'a> {
    reader: &'a mut StreamReader,
}

impl Iterator for FrameCapture<'_> {
    type Item = StreamFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.take_frame()
    }
}
