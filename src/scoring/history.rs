//! history.rs: immutable snapshot of which fingerprints earlier runs scored.
//!
//! Built once by the orchestrator before scoring; scorers only read it.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::RunId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryWindow {
    runs: BTreeMap<RunId, BTreeSet<String>>,
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the fingerprints one prior run scored.
    pub fn push_run<I, S>(&mut self, run_id: RunId, fingerprints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runs
            .entry(run_id)
            .or_default()
            .extend(fingerprints.into_iter().map(Into::into));
    }

    /// Number of distinct runs in the window that contained `fingerprint`.
    pub fn appearances(&self, fingerprint: &str) -> u32 {
        self.runs
            .values()
            .filter(|fps| fps.contains(fingerprint))
            .count() as u32
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_runs_not_rows() {
        let mut h = HistoryWindow::new();
        h.push_run(1, ["a", "b"]);
        h.push_run(2, ["a"]);
        h.push_run(2, ["a"]);
        assert_eq!(h.appearances("a"), 2);
        assert_eq!(h.appearances("b"), 1);
        assert_eq!(h.appearances("z"), 0);
        assert_eq!(h.run_count(), 2);
    }
}
