/* src/synthetic.rs */
//! Seeded generator of plausible snapshots for demos and tests.
//!
//! No physics: samples jitter around a regular cadence, a fixed emitter ring and
//! mirror-symmetric energies, and the jitter decays as the run progresses so a
//! healthy run settles. An optional outlier replaces one cycle's first energy with
//! a spike.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::collections::VecDeque;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::boundary::MetricsSource;
use crate::snapshot::{PerformanceSnapshot, Position};

const PERIOD_S: f64 = 0.1;
const PRIOR_WINDOW: usize = 8;
const BASE_ENERGY: f64 = 10.0;
const OUTLIER_ENERGY: f64 = 1.0e6;

/// Deterministic synthetic metrics source.
#[derive(Debug, Clone)]
pub struct SyntheticMetricsSource {
    rng: StdRng,
    cycle: u64,
    clock: f64,
    prior: VecDeque<f64>,
    jitter: f64,
    decay: f64,
    samples: usize,
    outlier_at: Option<u64>,
    limit: Option<u64>,
}

impl SyntheticMetricsSource {
    /// Unbounded source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            cycle: 0,
            clock: 0.0,
            prior: VecDeque::from(vec![0.0]),
            jitter: 0.05,
            decay: 0.95,
            samples: 8,
            outlier_at: None,
            limit: None,
        }
    }

    /// Injects an extreme energy outlier on cycle `cycle` (1-based).
    pub fn with_outlier_at(mut self, cycle: u64) -> Self {
        self.outlier_at = Some(cycle);
        self
    }

    /// Stops after `cycles` snapshots.
    pub fn with_limit(mut self, cycles: u64) -> Self {
        self.limit = Some(cycles);
        self
    }

    /// Initial relative jitter and its per-cycle decay factor.
    pub fn with_jitter(mut self, jitter: f64, decay: f64) -> Self {
        self.jitter = jitter.abs();
        self.decay = decay.clamp(0.0, 1.0);
        self
    }

    fn noise(&mut self, scale: f64) -> f64 {
        if scale == 0.0 {
            return 0.0;
        }
        self.rng.random_range(-scale..scale)
    }
}

impl MetricsSource for SyntheticMetricsSource {
    fn next_snapshot(&mut self) -> Option<PerformanceSnapshot> {
        if self.limit.is_some_and(|limit| self.cycle >= limit) {
            return None;
        }
        self.cycle += 1;
        let jitter = self.jitter * self.decay.powf(self.cycle as f64);

        self.clock += PERIOD_S * (1.0 + self.noise(jitter));
        let timestamp = self.clock;

        let positions: Vec<Position> = (0..self.samples)
            .map(|k| {
                let angle = std::f64::consts::TAU * k as f64 / self.samples as f64;
                [angle.cos() + self.noise(jitter), angle.sin() + self.noise(jitter), self.noise(jitter)]
            })
            .collect();

        let half = self.samples / 2;
        let mut energies: Vec<f64> = (0..half).map(|_| BASE_ENERGY * (1.0 + self.noise(jitter))).collect();
        let mirrored: Vec<f64> = energies.iter().rev().map(|e| e * (1.0 + self.noise(jitter * 0.1))).collect();
        energies.extend(mirrored);
        if self.outlier_at == Some(self.cycle) {
            energies[0] = OUTLIER_ENERGY;
        }

        let prior: Vec<f64> = self.prior.iter().copied().collect();
        self.prior.push_back(timestamp);
        if self.prior.len() > PRIOR_WINDOW {
            self.prior.pop_front();
        }

        Some(PerformanceSnapshot::new(timestamp, positions, energies, prior))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::SymmetryEvaluator;

    #[test]
    fn test_seeded_sources_agree() {
        let mut a = SyntheticMetricsSource::new(3).with_limit(5);
        let mut b = SyntheticMetricsSource::new(3).with_limit(5);
        for _ in 0..5 {
            assert_eq!(a.next_snapshot(), b.next_snapshot());
        }
        assert!(a.next_snapshot().is_none());
    }

    #[test]
    fn test_snapshots_are_scorable_and_outlier_is_injected() {
        let evaluator = SymmetryEvaluator::default();
        let mut source = SyntheticMetricsSource::new(9).with_outlier_at(4);
        for cycle in 1..=6 {
            let snapshot = source.next_snapshot().unwrap();
            assert!(evaluator.evaluate(&snapshot).is_ok(), "cycle {cycle}");
            assert_eq!(snapshot.energy_peak() == OUTLIER_ENERGY, cycle == 4);
        }
    }
}
