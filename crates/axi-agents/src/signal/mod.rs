//! Signal adapter seam and bus-handle primitives.
//!
//! Agents never touch simulator state directly. They resolve signals by name
//! through a [`SignalAdapter`], claim a [`DriveLine`] for every signal they
//! drive, and sample everything else by [`SignalId`].

/// In-memory signal store with deferred commit semantics.
pub mod bank;

pub use bank::SignalBank;

use thiserror::Error;

/// Raw value carried by a signal, masked to the signal width.
pub type LogicValue = u128;

/// Widest signal the adapter seam can carry.
pub const MAX_SIGNAL_WIDTH: u32 = 128;

/// Opaque handle for sampling a declared signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u32);

impl SignalId {
    /// Creates an id from an adapter-owned index.
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the adapter-owned index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Exclusive right to drive one signal.
///
/// A drive line is minted once per signal by [`SignalAdapter::claim`] and is
/// neither `Clone` nor `Copy`, so exactly one owner can drive the signal.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DriveLine {
    id: SignalId,
    mask: LogicValue,
}

impl DriveLine {
    /// Mints a drive line. Adapters must call this at most once per signal.
    #[must_use]
    pub const fn new(id: SignalId, width: u32) -> Self {
        Self {
            id,
            mask: width_mask(width),
        }
    }

    /// Returns the driven signal's id, for sampling the committed value.
    #[must_use]
    pub const fn id(&self) -> SignalId {
        self.id
    }

    /// Returns the value mask for the driven signal width.
    #[must_use]
    pub const fn mask(&self) -> LogicValue {
        self.mask
    }
}

/// Returns the all-ones mask for a signal of `width` bits.
#[must_use]
pub const fn width_mask(width: u32) -> LogicValue {
    if width >= MAX_SIGNAL_WIDTH {
        LogicValue::MAX
    } else {
        (1 << width) - 1
    }
}

/// Failures while resolving, declaring or claiming signals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum SignalError {
    /// No signal with this name is declared.
    #[error("unknown signal `{0}`")]
    Unknown(String),
    /// A signal with this name is already declared.
    #[error("signal `{0}` declared twice")]
    Duplicate(String),
    /// Width is zero or wider than [`MAX_SIGNAL_WIDTH`].
    #[error("signal `{name}` has unsupported width {width}")]
    InvalidWidth {
        /// Signal name.
        name: String,
        /// Requested width in bits.
        width: u32,
    },
    /// Another owner already holds the drive line.
    #[error("signal `{0}` already has a driver")]
    AlreadyDriven(String),
}

/// Signal-level access consumed by every agent.
///
/// Reads return the value committed at the current edge. Drives are
/// deferred and become visible at the next edge.
pub trait SignalAdapter {
    /// Resolves a signal name, returning `None` when it is not present.
    fn lookup(&self, name: &str) -> Option<SignalId>;

    /// Returns the declared width of a signal in bits.
    fn width(&self, id: SignalId) -> u32;

    /// Returns the name a signal was declared with.
    fn name(&self, id: SignalId) -> &str;

    /// Claims exclusive drive rights for a signal.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::AlreadyDriven`] when the signal already has an
    /// owner.
    fn claim(&mut self, id: SignalId) -> Result<DriveLine, SignalError>;

    /// Samples the committed value of a signal.
    fn get(&self, id: SignalId) -> LogicValue;

    /// Schedules a new value for a claimed signal.
    fn drive(&mut self, line: &DriveLine, value: LogicValue);
}

/// Name builder for `<prefix>_<field>` interface signals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortNames {
    prefix: String,
}

impl PortNames {
    /// Uses `prefix` verbatim.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Builds `<base>` or `<base>_<instance>`.
    #[must_use]
    pub fn with_instance(base: &str, instance: Option<&str>) -> Self {
        match instance {
            Some(instance) => Self::new(format!("{base}_{instance}")),
            None => Self::new(base),
        }
    }

    /// Returns the prefix shared by all interface signals.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the full name of one interface field.
    #[must_use]
    pub fn signal(&self, field: &str) -> String {
        format!("{}_{field}", self.prefix)
    }

    /// Resolves a mandatory field.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Unknown`] when the field is not declared.
    pub fn required(&self, bus: &dyn SignalAdapter, field: &str) -> Result<SignalId, SignalError> {
        let name = self.signal(field);
        bus.lookup(&name).ok_or(SignalError::Unknown(name))
    }

    /// Resolves an optional field.
    #[must_use]
    pub fn optional(&self, bus: &dyn SignalAdapter, field: &str) -> Option<SignalId> {
        bus.lookup(&self.signal(field))
    }

    /// Resolves and claims a mandatory output field.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Unknown`] when the field is not declared and
    /// [`SignalError::AlreadyDriven`] when another agent drives it.
    pub fn claim(&self, bus: &mut dyn SignalAdapter, field: &str) -> Result<DriveLine, SignalError> {
        let id = self.required(bus, field)?;
        bus.claim(id)
    }

    /// Resolves and claims an optional output field.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::AlreadyDriven`] when the field exists and
    /// another agent drives it.
    pub fn claim_optional(
        &self,
        bus: &mut dyn SignalAdapter,
        field: &str,
    ) -> Result<Option<DriveLine>, SignalError> {
        match self.optional(bus, field) {
            Some(id) => bus.claim(id).map(Some),
            None => Ok(None),
        }
    }
}

/// Returns `true` when a sampled signal is non-zero.
#[must_use]
pub fn is_high(bus: &dyn SignalAdapter, id: SignalId) -> bool {
    bus.get(id) != 0
}

#[cfg(test)]
mod tests {
    use super::{width_mask, DriveLine, PortNames, SignalId, MAX_SIGNAL_WIDTH};

    #[test]
    fn width_mask_covers_edge_widths() {
        assert_eq!(width_mask(1), 0b1);
        assert_eq!(width_mask(8), 0xFF);
        assert_eq!(width_mask(64), u128::from(u64::MAX));
        assert_eq!(width_mask(MAX_SIGNAL_WIDTH), u128::MAX);
    }

    #[test]
    fn drive_line_carries_width_mask() {
        let line = DriveLine::new(SignalId::from_index(3), 4);
        assert_eq!(line.id().index(), 3);
        assert_eq!(line.mask(), 0xF);
    }

    #[test]
    fn port_names_follow_prefix_convention() {
        assert_eq!(PortNames::new("s_axi").signal("awaddr"), "s_axi_awaddr");
        assert_eq!(
            PortNames::with_instance("m_axis", Some("rx")).signal("tdata"),
            "m_axis_rx_tdata"
        );
        assert_eq!(PortNames::with_instance("m_axi", None).prefix(), "m_axi");
    }
}
