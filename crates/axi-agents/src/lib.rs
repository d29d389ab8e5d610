//! Cycle-stepped AXI bus agents for simulation testbenches.

/// Signal adapter seam, drive ownership and the in-memory signal bank.
pub mod signal;
pub use signal::{
    is_high, width_mask, DriveLine, LogicValue, PortNames, SignalAdapter, SignalBank,
    SignalError, SignalId, MAX_SIGNAL_WIDTH,
};

/// AXI wire encodings and validated transaction descriptors.
pub mod protocol;
pub use protocol::{
    BurstKind, BurstRequest, Channel, Direction, LiteRead, LiteWrite, Response,
    MAX_BURST_BEATS, MAX_SIZE_ENCODING,
};

/// Fault taxonomy shared by every agent.
pub mod fault;
pub use fault::{BusFault, FaultClass, TbError};

/// Deterministic trace events and sinks.
pub mod trace;
pub use trace::{TraceEvent, TraceRecorder, TraceSink};

/// Edge scheduler and the agent trait.
pub mod testbench;
pub use testbench::{
    EdgeAgent, EdgeContext, Progress, Testbench, TestbenchConfig, DEFAULT_CLOCK_PERIOD_PS,
    DEFAULT_MAX_WAIT_EDGES,
};

/// AXI4-Lite register transactors.
pub mod lite;
pub use lite::{LiteConfig, LiteReadResult, LiteReader, LiteWriter};

/// AXI4-Stream frame transactors.
pub mod stream;
pub use stream::{
    FrameCapture, ReadyPolicy, StreamConfig, StreamFrame, StreamReader, StreamWriter,
    StreamWriterConfig,
};

/// Simplified AXI4 memory slave and its backing store.
pub mod memory;
pub use memory::{
    BackingStore, LatencyProfile, MemorySlave, MemorySlaveConfig, SlaveStats,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tracing_subscriber as _;
