/* src/local.rs */
//! # Local Stabilizer
//!
//! Bounded hill-climb over one partition of the global matrix. The stabilizer clones
//! the full matrix, perturbs only the cells inside its region, and scores every
//! proposal on the whole matrix as `objective + penalty`. Only strict improvements are
//! accepted. The step halves after `stall_limit` rejected proposals in a row and the
//! search ends after `max_iterations` proposals or once the step falls below
//! `min_step`, whichever comes first. An abandoned pass stops at the next proposal.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::balance::{penalty, MagicSumTarget};
use crate::config::LocalSearchParams;
use crate::error::{LumistabError, Result};
use crate::hashing::derive_seed;
use crate::matrix::SystemMatrix;
use crate::objective::Objective;
use crate::topology::Region;

/// Solver bound to one partition of the static topology.
#[derive(Debug, Clone)]
pub struct LocalStabilizer {
    index: usize,
    region: Region,
    params: LocalSearchParams,
    target: MagicSumTarget,
    seed: u64,
}

impl LocalStabilizer {
    /// Creates the solver for partition `index`.
    pub fn new(index: usize, region: Region, params: LocalSearchParams, target: MagicSumTarget, seed: u64) -> Self {
        Self { index, region, params, target, seed }
    }

    /// Partition index in the topology.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The region this solver writes back.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Optimizes the partition's cells of `matrix` and returns the improved block.
    ///
    /// `matrix` is never mutated. The RNG is seeded from `(seed, cycle, index)`, so
    /// the result does not depend on which worker thread runs the call. `cancel` is
    /// polled before every proposal and yields [`LumistabError::Cancelled`] once fired.
    #[instrument(level = "trace", skip(self, matrix, objective, cancel), fields(partition = self.index))]
    pub fn local_optimize(
        &self,
        matrix: &SystemMatrix,
        objective: &dyn Objective,
        cycle: u64,
        cancel: &CancellationToken,
    ) -> Result<Array2<f64>> {
        let fail = |reason: String| LumistabError::partition(self.index, reason);

        if matrix.dimension() != self.target.dimension() {
            return Err(fail(format!(
                "matrix dimension {} does not match target dimension {}",
                matrix.dimension(),
                self.target.dimension()
            )));
        }
        // Region bounds are checked here as well as at topology construction.
        matrix.region(&self.region).map_err(|e| fail(e.to_string()))?;
        if !matrix.is_finite() {
            return Err(fail("non-finite cell in candidate".to_string()));
        }

        let fitness_of = |m: &SystemMatrix| objective.evaluate(m) + penalty(m, self.target).value();

        let mut working = matrix.clone();
        let mut fitness = fitness_of(&working);
        if !fitness.is_finite() {
            return Err(fail(format!("objective '{}' returned a non-finite value", objective.name())));
        }
        let initial = fitness;

        let cells: Vec<(usize, usize)> = self.region.cells().collect();
        let mut rng = StdRng::seed_from_u64(derive_seed(self.seed, &[cycle, self.index as u64]));
        let mut step = self.params.step_size;
        let mut stalls = 0u32;
        let mut accepted = 0u32;
        let mut iterations = 0u32;

        while iterations < self.params.max_iterations && step >= self.params.min_step {
            if cancel.is_cancelled() {
                debug!(partition = self.index, iterations, "local pass abandoned");
                return Err(LumistabError::Cancelled);
            }
            iterations += 1;
            let cell = cells[rng.random_range(0..cells.len())];
            let delta = if rng.random_bool(0.5) { step } else { -step };
            let previous = working[cell];
            working[cell] = previous + delta;

            let proposal = fitness_of(&working);
            if proposal.is_finite() && proposal < fitness {
                fitness = proposal;
                stalls = 0;
                accepted += 1;
            } else {
                working[cell] = previous;
                stalls += 1;
                if stalls >= self.params.stall_limit {
                    step /= 2.0;
                    stalls = 0;
                }
            }
        }

        debug!(
            partition = self.index,
            region = %self.region,
            iterations,
            accepted,
            initial_fitness = initial,
            fitness,
            "local pass finished"
        );
        histogram!("local_stabilizer_iterations").record(f64::from(iterations));

        working.region(&self.region).map_err(|e| fail(e.to_string()))
    }
}
