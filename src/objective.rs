/* src/objective.rs */
//! The objective capability supplied to the stabilizers.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use crate::matrix::SystemMatrix;

/// Scores a candidate matrix; lower is better.
///
/// The only extension seam of the stabilization core. Implementations are shared
/// across partition tasks, so they must be thread-safe and must not mutate the
/// candidate.
pub trait Objective: Send + Sync {
    /// Objective value for `candidate`.
    fn evaluate(&self, candidate: &SystemMatrix) -> f64;

    /// Name used in logs.
    fn name(&self) -> &str {
        "objective"
    }
}

/// Objective that is always zero, leaving the balance penalty as the only term.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroObjective;

impl Objective for ZeroObjective {
    fn evaluate(&self, _candidate: &SystemMatrix) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "zero"
    }
}

impl<F> Objective for F
where
    F: Fn(&SystemMatrix) -> f64 + Send + Sync,
{
    fn evaluate(&self, candidate: &SystemMatrix) -> f64 {
        self(candidate)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_closures_and_zero_objective() {
        let m = SystemMatrix::filled(3, 2.0).unwrap();
        let sum_cells: Arc<dyn Objective> = Arc::new(|c: &SystemMatrix| c.view().sum());
        assert_eq!(sum_cells.evaluate(&m), 18.0);
        assert_eq!(sum_cells.name(), "closure");
        assert_eq!(ZeroObjective.evaluate(&m), 0.0);
    }
}
