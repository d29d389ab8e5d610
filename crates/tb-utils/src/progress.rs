use tracing::info;

/// Logs progress of a fixed-length loop at every 10% step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReporter {
    label: String,
    total: u64,
    next_decile: u64,
}

impl ProgressReporter {
    /// Tracks `total` iterations under `label`.
    #[must_use]
    pub fn new(label: &str, total: u64) -> Self {
        Self {
            label: label.to_string(),
            total,
            next_decile: 0,
        }
    }

    /// Records that iteration `index` (zero based) finished and returns the
    /// percentage logged, if this iteration crossed a 10% step.
    pub fn record(&mut self, index: u64) -> Option<u64> {
        if self.total == 0 {
            return None;
        }
        let done = index.saturating_add(1).min(self.total);
        let decile = done * 10 / self.total;
        if decile < self.next_decile {
            return None;
        }
        self.next_decile = decile + 1;

        let percent = decile * 10;
        if done == self.total {
            info!(label = %self.label, total = self.total, "done");
        } else {
            info!(label = %self.label, percent, "progress");
        }
        Some(percent)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::ProgressReporter;

    #[test]
    fn reports_each_decile_once() {
        let mut progress = ProgressReporter::new("frames", 100);

        let reported: Vec<_> = (0..100).filter_map(|i| progress.record(i)).collect();

        assert_eq!(reported, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[rstest]
    #[case(3, vec![30, 60, 100])]
    #[case(1, vec![100])]
    #[case(0, vec![])]
    fn short_runs_report_crossed_steps(#[case] total: u64, #[case] expected: Vec<u64>) {
        let mut progress = ProgressReporter::new("short", total);

        let reported: Vec<_> = (0..total).filter_map(|i| progress.record(i)).collect();

        assert_eq!(reported, expected);
    }
}
