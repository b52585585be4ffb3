/* src/snapshot.rs */
//! Per-cycle performance snapshot delivered by a metrics source.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use serde::{Deserialize, Serialize};

/// A 3D position sample.
pub type Position = [f64; 3];

/// Immutable record produced once per cycle by the metrics source.
///
/// Fields are private so a snapshot cannot be altered after construction;
/// consumers only ever read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    timestamp: f64,
    positions: Vec<Position>,
    energies: Vec<f64>,
    prior_timestamps: Vec<f64>,
}

impl PerformanceSnapshot {
    /// Creates a snapshot. Validation happens at evaluation time.
    pub fn new(timestamp: f64, positions: Vec<Position>, energies: Vec<f64>, prior_timestamps: Vec<f64>) -> Self {
        Self { timestamp, positions, energies, prior_timestamps }
    }

    /// Sample timestamp in seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Ordered position samples.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Ordered energy values.
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Timestamps of earlier samples, oldest first.
    pub fn prior_timestamps(&self) -> &[f64] {
        &self.prior_timestamps
    }

    /// Sum of all energy values.
    pub fn energy_total(&self) -> f64 {
        self.energies.iter().sum()
    }

    /// Largest absolute energy value, or 0 when there are none.
    pub fn energy_peak(&self) -> f64 {
        self.energies.iter().fold(0.0_f64, |acc, e| acc.max(e.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_aggregates() {
        let snapshot = PerformanceSnapshot::new(1.0, vec![[0.0; 3]], vec![2.0, -5.0, 1.0], vec![0.5]);
        assert_eq!(snapshot.energy_total(), -2.0);
        assert_eq!(snapshot.energy_peak(), 5.0);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"timestamp":2.0,"positions":[[1.0,2.0,3.0]],"energies":[1.0,1.0],"prior_timestamps":[1.0]}"#;
        let snapshot: PerformanceSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.positions()[0], [1.0, 2.0, 3.0]);
        assert_eq!(snapshot.prior_timestamps(), &[1.0]);
    }
}
