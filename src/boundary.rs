/* src/boundary.rs */
//! Producer and consumer seams of the control loop.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::collections::VecDeque;

use crate::error::Result;
use crate::optimizer::OptimizationResult;
use crate::snapshot::PerformanceSnapshot;

/// Supplies one snapshot per cycle; `None` ends the run.
pub trait MetricsSource: Send {
    /// Next snapshot, if any.
    fn next_snapshot(&mut self) -> Option<PerformanceSnapshot>;
}

/// Receives the result of every completed cycle.
pub trait ApparatusSink: Send {
    /// Applies `result` to the apparatus.
    fn apply(&mut self, result: &OptimizationResult) -> Result<()>;
}

/// Replays a fixed list of snapshots in order.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    snapshots: VecDeque<PerformanceSnapshot>,
}

impl ReplaySource {
    /// Source over `snapshots`.
    pub fn new(snapshots: impl IntoIterator<Item = PerformanceSnapshot>) -> Self {
        Self { snapshots: snapshots.into_iter().collect() }
    }

    /// Snapshots not yet delivered.
    pub fn remaining(&self) -> usize {
        self.snapshots.len()
    }
}

impl MetricsSource for ReplaySource {
    fn next_snapshot(&mut self) -> Option<PerformanceSnapshot> {
        self.snapshots.pop_front()
    }
}

/// Keeps every applied result in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    results: Vec<OptimizationResult>,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Results applied so far, in cycle order.
    pub fn results(&self) -> &[OptimizationResult] {
        &self.results
    }

    /// Consumes the sink.
    pub fn into_results(self) -> Vec<OptimizationResult> {
        self.results
    }
}

impl ApparatusSink for RecordingSink {
    fn apply(&mut self, result: &OptimizationResult) -> Result<()> {
        self.results.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_source_drains_in_order() {
        let a = PerformanceSnapshot::new(1.0, vec![[0.0; 3]], vec![1.0], vec![0.0]);
        let b = PerformanceSnapshot::new(2.0, vec![[0.0; 3]], vec![1.0], vec![1.0]);
        let mut source = ReplaySource::new(vec![a.clone(), b.clone()]);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_snapshot(), Some(a));
        assert_eq!(source.next_snapshot(), Some(b));
        assert_eq!(source.next_snapshot(), None);
    }
}
