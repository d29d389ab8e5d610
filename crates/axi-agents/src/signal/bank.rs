//! In-memory signal store used by the edge scheduler.

use std::collections::BTreeMap;

use super::{DriveLine, LogicValue, SignalAdapter, SignalError, SignalId, MAX_SIGNAL_WIDTH};

#[derive(Debug, Clone)]
struct SignalSlot {
    name: String,
    width: u32,
    value: LogicValue,
    driven: bool,
}

/// Declared signals, their committed values and pending drives.
///
/// Drives are buffered until [`SignalBank::commit`]; until then every reader
/// observes the previously committed snapshot.
#[derive(Debug, Clone, Default)]
pub struct SignalBank {
    slots: Vec<SignalSlot>,
    index: BTreeMap<String, SignalId>,
    pending: Vec<(SignalId, LogicValue)>,
}

impl SignalBank {
    /// Creates an empty bank.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a zero-initialized signal.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Duplicate`] when the name is taken and
    /// [`SignalError::InvalidWidth`] for widths outside `1..=128`.
    pub fn declare(&mut self, name: impl Into<String>, width: u32) -> Result<SignalId, SignalError> {
        let name = name.into();
        if width == 0 || width > MAX_SIGNAL_WIDTH {
            return Err(SignalError::InvalidWidth { name, width });
        }
        if self.index.contains_key(&name) {
            return Err(SignalError::Duplicate(name));
        }

        let id = SignalId::from_index(
            u32::try_from(self.slots.len()).map_err(|_| SignalError::InvalidWidth {
                name: name.clone(),
                width,
            })?,
        );
        self.index.insert(name.clone(), id);
        self.slots.push(SignalSlot {
            name,
            width,
            value: 0,
            driven: false,
        });
        Ok(id)
    }

    /// Resolves a declared signal by name.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Unknown`] when the name is not declared.
    pub fn resolve(&self, name: &str) -> Result<SignalId, SignalError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SignalError::Unknown(name.to_string()))
    }

    /// Claims a signal by name.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Unknown`] or [`SignalError::AlreadyDriven`].
    pub fn claim_named(&mut self, name: &str) -> Result<DriveLine, SignalError> {
        let id = self.resolve(name)?;
        self.claim(id)
    }

    /// Gives up drive rights so another owner may claim the signal.
    pub fn release(&mut self, line: DriveLine) {
        if let Some(slot) = self.slots.get_mut(line.id().index()) {
            slot.driven = false;
        }
    }

    /// Returns the number of declared signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when no signal is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns `true` when drives are waiting for the next commit.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Applies pending drives in issue order and returns how many changed a value.
    pub fn commit(&mut self) -> usize {
        let mut changed = 0;
        for (id, value) in self.pending.drain(..) {
            if let Some(slot) = self.slots.get_mut(id.index()) {
                if slot.value != value {
                    slot.value = value;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Iterates declared names with their committed values, in name order.
    pub fn snapshot(&self) -> impl Iterator<Item = (&str, LogicValue)> + '_ {
        self.index
            .iter()
            .map(|(name, id)| (name.as_str(), self.slots[id.index()].value))
    }
}

impl SignalAdapter for SignalBank {
    fn lookup(&self, name: &str) -> Option<SignalId> {
        self.index.get(name).copied()
    }

    fn width(&self, id: SignalId) -> u32 {
        self.slots.get(id.index()).map_or(0, |slot| slot.width)
    }

    fn name(&self, id: SignalId) -> &str {
        self.slots.get(id.index()).map_or("", |slot| slot.name.as_str())
    }

    fn claim(&mut self, id: SignalId) -> Result<DriveLine, SignalError> {
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or_else(|| SignalError::Unknown(format!("#{}", id.index())))?;
        if slot.driven {
            return Err(SignalError::AlreadyDriven(slot.name.clone()));
        }
        slot.driven = true;
        Ok(DriveLine::new(id, slot.width))
    }

    fn get(&self, id: SignalId) -> LogicValue {
        self.slots.get(id.index()).map_or(0, |slot| slot.value)
    }

    fn drive(&mut self, line: &DriveLine, value: LogicValue) {
        self.pending.push((line.id(), value & line.mask()));
    }
}

#[cfg(test)]
mod tests {
    use super::SignalBank;
    use crate::signal::{SignalAdapter, SignalError};

    #[test]
    fn declare_rejects_duplicates_and_bad_widths() {
        let mut bank = SignalBank::new();
        bank.declare("clk_en", 1).expect("first declaration");

        assert_eq!(
            bank.declare("clk_en", 1),
            Err(SignalError::Duplicate("clk_en".to_string()))
        );
        assert!(matches!(
            bank.declare("wide", 129),
            Err(SignalError::InvalidWidth { width: 129, .. })
        ));
        assert!(matches!(
            bank.declare("empty", 0),
            Err(SignalError::InvalidWidth { width: 0, .. })
        ));
    }

    #[test]
    fn second_claim_is_rejected_until_release() {
        let mut bank = SignalBank::new();
        let id = bank.declare("awvalid", 1).expect("declare");

        let line = bank.claim(id).expect("first claim");
        assert_eq!(
            bank.claim(id),
            Err(SignalError::AlreadyDriven("awvalid".to_string()))
        );

        bank.release(line);
        assert!(bank.claim(id).is_ok());
    }

    #[test]
    fn drives_are_invisible_until_commit() {
        let mut bank = SignalBank::new();
        let id = bank.declare("tdata", 8).expect("declare");
        let line = bank.claim(id).expect("claim");

        bank.drive(&line, 0x1AB);
        assert_eq!(bank.get(id), 0);
        assert!(bank.has_pending());

        assert_eq!(bank.commit(), 1);
        assert_eq!(bank.get(id), 0xAB, "value is masked to the signal width");
        assert!(!bank.has_pending());
    }

    #[test]
    fn last_drive_in_an_edge_wins() {
        let mut bank = SignalBank::new();
        let id = bank.declare("rready", 1).expect("declare");
        let line = bank.claim(id).expect("claim");

        bank.drive(&line, 1);
        bank.drive(&line, 0);
        bank.commit();

        assert_eq!(bank.get(id), 0);
    }

    #[test]
    fn resolve_reports_unknown_names() {
        let bank = SignalBank::new();
        assert_eq!(
            bank.resolve("missing"),
            Err(SignalError::Unknown("missing".to_string()))
        );
        assert!(bank.lookup("missing").is_none());
        assert!(bank.is_empty());
    }

    #[test]
    fn snapshot_lists_names_in_order() {
        let mut bank = SignalBank::new();
        bank.declare("b", 1).expect("declare");
        bank.declare("a", 4).expect("declare");

        let names: Vec<_> = bank.snapshot().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(bank.len(), 2);
    }
}
