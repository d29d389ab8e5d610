use crate::{BusFault, Channel, LogicValue};

/// Ordered words of one AXI4-Stream transfer.
///
/// A frame always holds at least one word and its end marker is structural:
/// `TLAST` is driven on the final word only. `TUSER` values are stored
/// without trailing zeros, so a frame given no user values equals the same
/// frame captured from a bus that carries `TUSER`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StreamFrame {
    data: Vec<LogicValue>,
    last_keep: Option<LogicValue>,
    user: Vec<LogicValue>,
}

impl StreamFrame {
    /// Builds a frame with every byte of every word valid.
    ///
    /// # Errors
    ///
    /// Returns [`BusFault::ProtocolViolation`] for an empty word list; a
    /// stream transfer cannot end without a word carrying `TLAST`.
    pub fn from_words(words: impl IntoIterator<Item = LogicValue>) -> Result<Self, BusFault> {
        let data: Vec<_> = words.into_iter().collect();
        if data.is_empty() {
            return Err(BusFault::ProtocolViolation {
                channel: Channel::Stream,
                detail: "frame without words".to_string(),
            });
        }
        Ok(Self {
            data,
            last_keep: None,
            user: Vec::new(),
        })
    }

    /// Sets the `TKEEP` value of the final word.
    #[must_use]
    pub fn with_last_keep(mut self, keep: LogicValue) -> Self {
        self.last_keep = Some(keep);
        self
    }

    /// Sets per-word `TUSER` values; missing trailing entries are driven as
    /// zero and entries past the last word are dropped.
    #[must_use]
    pub fn with_user(mut self, user: Vec<LogicValue>) -> Self {
        self.user = trim_user(user, self.data.len());
        self
    }

    /// Returns the data words.
    #[must_use]
    pub fn data(&self) -> &[LogicValue] {
        &self.data
    }

    /// Returns the final word's `TKEEP`, `None` meaning all bytes valid.
    #[must_use]
    pub const fn last_keep(&self) -> Option<LogicValue> {
        self.last_keep
    }

    /// Returns the per-word `TUSER` values up to the last nonzero one.
    #[must_use]
    pub fn user(&self) -> &[LogicValue] {
        &self.user
    }

    /// Number of words in the frame.
    #[must_use]
    pub fn beats(&self) -> usize {
        self.data.len()
    }

    /// `TUSER` value driven with word `index`.
    #[must_use]
    pub fn user_at(&self, index: usize) -> LogicValue {
        self.user.get(index).copied().unwrap_or(0)
    }

    /// `TKEEP` value driven with word `index` on a bus whose all-lanes mask
    /// is `full_keep`.
    #[must_use]
    pub fn keep_at(&self, index: usize, full_keep: LogicValue) -> LogicValue {
        if index + 1 == self.data.len() {
            self.last_keep.unwrap_or(full_keep)
        } else {
            full_keep
        }
    }

    /// Returns `true` when `index` is the final word.
    #[must_use]
    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.data.len()
    }

    pub(crate) fn assemble(
        data: Vec<LogicValue>,
        last_keep: Option<LogicValue>,
        user: Vec<LogicValue>,
    ) -> Self {
        let user = trim_user(user, data.len());
        Self {
            data,
            last_keep,
            user,
        }
    }
}

fn trim_user(mut user: Vec<LogicValue>, words: usize) -> Vec<LogicValue> {
    user.truncate(words);
    while user.last() == Some(&0) {
        user.pop();
    }
    user
}

#[cfg(test)]
mod tests {
    use super::StreamFrame;
    use crate::BusFault;

    #[test]
    fn empty_frame_is_rejected() {
        assert!(matches!(
            StreamFrame::from_words([]),
            Err(BusFault::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn keep_is_full_except_on_last_word() {
        let frame = StreamFrame::from_words([1, 2, 3])
            .expect("frame")
            .with_last_keep(0x0F);

        assert_eq!(frame.keep_at(0, 0xFF), 0xFF);
        assert_eq!(frame.keep_at(1, 0xFF), 0xFF);
        assert_eq!(frame.keep_at(2, 0xFF), 0x0F);
        assert!(frame.is_last(2));
        assert!(!frame.is_last(1));
    }

    #[test]
    fn missing_user_entries_are_zero() {
        let frame = StreamFrame::from_words([1, 2, 3])
            .expect("frame")
            .with_user(vec![7]);

        assert_eq!(frame.user_at(0), 7);
        assert_eq!(frame.user_at(2), 0);
        assert_eq!(frame.beats(), 3);
    }

    #[test]
    fn zero_user_values_compare_equal_to_none() {
        let plain = StreamFrame::from_words([1, 2, 3]).expect("frame");
        let zeros = plain.clone().with_user(vec![0, 0, 0]);
        let tagged = plain.clone().with_user(vec![0, 5, 0, 9]);

        assert_eq!(zeros, plain);
        assert!(zeros.user().is_empty());
        assert_eq!(tagged.user(), &[0, 5]);
        assert_ne!(tagged, plain);
    }
}
