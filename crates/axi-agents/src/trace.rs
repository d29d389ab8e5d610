//! Deterministic record of handshakes, bursts and faults.

use crate::{BurstRequest, BusFault, Channel, Direction, LogicValue, Response};

/// Execution-order event emitted by agents.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TraceEvent {
    /// A valid/ready pair was high on the same edge.
    Handshake {
        /// Edge index of the handshake.
        edge: u64,
        /// Agent that observed it.
        agent: String,
        /// Channel that transferred.
        channel: Channel,
        /// Payload carried by the transfer (address or data).
        value: LogicValue,
    },
    /// A memory-mapped burst completed its address phase.
    BurstAccepted {
        /// Edge index of the address handshake.
        edge: u64,
        /// Agent that accepted it.
        agent: String,
        /// Decoded request.
        request: BurstRequest,
    },
    /// The last beat or response of a transaction was transferred.
    TransactionCompleted {
        /// Edge index of the final handshake.
        edge: u64,
        /// Agent that completed it.
        agent: String,
        /// Transfer direction.
        direction: Direction,
        /// Number of data beats moved.
        beats: u16,
        /// Final response status.
        resp: Response,
    },
    /// A stream frame ended with `TLAST`.
    FrameCompleted {
        /// Edge index of the final beat.
        edge: u64,
        /// Agent that captured or sent it.
        agent: String,
        /// Number of words in the frame.
        beats: usize,
    },
    /// A fault was logged or raised.
    Fault {
        /// Edge index where the fault was detected.
        edge: u64,
        /// Agent that detected it.
        agent: String,
        /// Fault details.
        fault: BusFault,
    },
}

impl TraceEvent {
    /// Returns the edge index the event was recorded at.
    #[must_use]
    pub const fn edge(&self) -> u64 {
        match self {
            Self::Handshake { edge, .. }
            | Self::BurstAccepted { edge, .. }
            | Self::TransactionCompleted { edge, .. }
            | Self::FrameCompleted { edge, .. }
            | Self::Fault { edge, .. } => *edge,
        }
    }
}

/// Host callback interface for deterministic trace hooks.
pub trait TraceSink {
    /// Records an event in execution order.
    fn on_event(&mut self, event: TraceEvent);
}

/// In-memory sink retained by the testbench.
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    enabled: bool,
    events: Vec<TraceEvent>,
}

impl TraceRecorder {
    /// Creates a recorder; a disabled recorder drops every event.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Vec::new(),
        }
    }

    /// Returns `true` when events are retained.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns recorded events in execution order.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Removes and returns all recorded events.
    pub fn drain(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }
}

impl TraceSink for TraceRecorder {
    fn on_event(&mut self, event: TraceEvent) {
        if self.enabled {
            self.events.push(event);
        }
    }
}
