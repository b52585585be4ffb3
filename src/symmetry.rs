/* src/symmetry.rs */
//! # Symmetry Evaluator
//!
//! Scores how far one cycle's temporal, spatial and energy behaviour strays from
//! balance. Lower is better; zero means perfectly regular timing, no spatial spread
//! and mirror-symmetric energies.
//!
//! - **Temporal**: normalized variance `var/mean²` of the deltas over
//!   `prior_timestamps ++ [timestamp]`.
//! - **Spatial**: RMS distance of the positions from their centroid, divided by
//!   `max(|centroid|, 1)`.
//! - **Energy**: mirror pairing of element `i` with `n-1-i`,
//!   `Σ|a-b| / Σ(|a|+|b|)`.
//!
//! The weighted sum uses the weights fixed in configuration at construction.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SymmetryWeights;
use crate::error::{LumistabError, Result};
use crate::snapshot::{PerformanceSnapshot, Position};

/// Scalar symmetry mismatch in `[0, ∞)`; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymmetryScore(pub(crate) f64);

impl SymmetryScore {
    /// Raw score value.
    #[inline]
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for SymmetryScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// The three sub-scores behind a [`SymmetryScore`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymmetryBreakdown {
    /// Timing irregularity.
    pub temporal: f64,
    /// Positional dispersion.
    pub spatial: f64,
    /// Paired energy imbalance.
    pub energy: f64,
    /// Weighted combination of the three.
    pub score: SymmetryScore,
}

/// Pure, deterministic snapshot scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetryEvaluator {
    weights: SymmetryWeights,
}

impl Default for SymmetryEvaluator {
    fn default() -> Self {
        Self { weights: SymmetryWeights::default() }
    }
}

impl SymmetryEvaluator {
    /// Evaluator using the given (already validated) weights.
    pub fn new(weights: SymmetryWeights) -> Self {
        Self { weights }
    }

    /// Weights in effect.
    pub fn weights(&self) -> SymmetryWeights {
        self.weights
    }

    /// Computes the weighted symmetry score.
    pub fn evaluate(&self, snapshot: &PerformanceSnapshot) -> Result<SymmetryScore> {
        self.evaluate_detailed(snapshot).map(|b| b.score)
    }

    /// Computes every sub-score and the weighted score.
    pub fn evaluate_detailed(&self, snapshot: &PerformanceSnapshot) -> Result<SymmetryBreakdown> {
        let temporal = temporal_irregularity(snapshot.prior_timestamps(), snapshot.timestamp())?;
        let spatial = spatial_dispersion(snapshot.positions())?;
        let energy = energy_imbalance(snapshot.energies())?;
        let w = self.weights;
        let score = w.temporal * temporal + w.spatial * spatial + w.energy * energy;
        Ok(SymmetryBreakdown { temporal, spatial, energy, score: SymmetryScore(score) })
    }
}

fn invalid(reason: impl Into<String>) -> LumistabError {
    LumistabError::InvalidSnapshot(reason.into())
}

fn temporal_irregularity(prior: &[f64], timestamp: f64) -> Result<f64> {
    if prior.is_empty() {
        return Err(invalid("no prior timestamps"));
    }
    if !timestamp.is_finite() || prior.iter().any(|t| !t.is_finite()) {
        return Err(invalid("non-finite timestamp"));
    }
    let deltas: Vec<f64> = prior
        .iter()
        .chain(std::iter::once(&timestamp))
        .collect::<Vec<_>>()
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect();
    let n = deltas.len() as f64;
    let mean = deltas.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return Err(invalid(format!("timestamps do not advance (mean delta {mean})")));
    }
    let variance = deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    Ok(variance / (mean * mean))
}

fn spatial_dispersion(positions: &[Position]) -> Result<f64> {
    if positions.is_empty() {
        return Err(invalid("no position samples"));
    }
    if positions.iter().flatten().any(|v| !v.is_finite()) {
        return Err(invalid("non-finite position"));
    }
    let n = positions.len() as f64;
    let mut centroid = [0.0; 3];
    for p in positions {
        for axis in 0..3 {
            centroid[axis] += p[axis] / n;
        }
    }
    let mean_sq = positions
        .iter()
        .map(|p| (0..3).map(|axis| (p[axis] - centroid[axis]).powi(2)).sum::<f64>())
        .sum::<f64>()
        / n;
    let scale = centroid.iter().map(|c| c * c).sum::<f64>().sqrt().max(1.0);
    Ok(mean_sq.sqrt() / scale)
}

fn energy_imbalance(energies: &[f64]) -> Result<f64> {
    if energies.is_empty() {
        return Err(invalid("no energy samples"));
    }
    if energies.iter().any(|e| !e.is_finite()) {
        return Err(invalid("non-finite energy"));
    }
    let n = energies.len();
    let (mut diff, mut total) = (0.0, 0.0);
    // An odd middle element pairs with itself and only adds to the total.
    for i in 0..n.div_ceil(2) {
        let (a, b) = (energies[i], energies[n - 1 - i]);
        diff += (a - b).abs();
        total += a.abs() + b.abs();
    }
    if total == 0.0 {
        return Ok(0.0);
    }
    Ok(diff / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(energies: Vec<f64>) -> PerformanceSnapshot {
        PerformanceSnapshot::new(
            4.0,
            vec![[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]],
            energies,
            vec![1.0, 2.0, 3.0],
        )
    }

    #[test]
    fn test_regular_symmetric_snapshot() {
        let breakdown = SymmetryEvaluator::default()
            .evaluate_detailed(&snapshot(vec![5.0, 2.0, 5.0]))
            .unwrap();
        assert_eq!(breakdown.temporal, 0.0);
        assert_eq!(breakdown.energy, 0.0);
        // centroid at the origin, every sample at distance 1
        assert!((breakdown.spatial - 1.0).abs() < 1e-12);
        assert!((breakdown.score.value() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_sub_scores() {
        assert!((energy_imbalance(&[3.0, 1.0]).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(energy_imbalance(&[0.0, 0.0]).unwrap(), 0.0);
        // deltas 1 and 3: mean 2, variance 1
        assert!((temporal_irregularity(&[0.0, 1.0], 4.0).unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(spatial_dispersion(&[[5.0, 5.0, 5.0]]).unwrap(), 0.0);
    }

    #[test]
    fn test_rejects_empty_and_malformed_input() {
        let evaluator = SymmetryEvaluator::default();
        let cases = [
            PerformanceSnapshot::new(1.0, vec![[0.0; 3]], vec![1.0], vec![]),
            PerformanceSnapshot::new(1.0, vec![], vec![1.0], vec![0.0]),
            PerformanceSnapshot::new(1.0, vec![[0.0; 3]], vec![], vec![0.0]),
            PerformanceSnapshot::new(1.0, vec![[0.0; 3]], vec![f64::NAN], vec![0.0]),
            PerformanceSnapshot::new(0.0, vec![[0.0; 3]], vec![1.0], vec![1.0]),
        ];
        for case in &cases {
            let err = evaluator.evaluate(case).unwrap_err();
            assert!(err.is_invalid_snapshot(), "{err}");
        }
    }

    proptest! {
        #[test]
        fn prop_evaluate_is_deterministic(
            energies in proptest::collection::vec(-1e3f64..1e3, 1..32),
            xs in proptest::collection::vec(-10.0f64..10.0, 1..16),
            step in 0.01f64..2.0,
        ) {
            let positions: Vec<Position> = xs.iter().map(|&x| [x, -x, x * 0.5]).collect();
            let prior: Vec<f64> = (0..5).map(|i| i as f64 * step).collect();
            let snap = PerformanceSnapshot::new(5.0 * step + step, positions, energies, prior);
            let evaluator = SymmetryEvaluator::default();
            let a = evaluator.evaluate(&snap).unwrap();
            let b = evaluator.evaluate(&snap.clone()).unwrap();
            prop_assert_eq!(a.value().to_bits(), b.value().to_bits());
            prop_assert!(a.value() >= 0.0);
        }
    }
}
