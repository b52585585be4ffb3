/* src/balance.rs */
//! # Balance Constraint Engine
//!
//! Measures how far a candidate matrix is from magic-sum balance: every row, every
//! column and both main diagonals summing to `D·(D²+1)/2`.
//!
//! The penalty is the raw sum of squared deviations and is not normalized by
//! dimension: larger matrices report larger penalties.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::matrix::SystemMatrix;

/// The common line sum of a balanced `D x D` matrix populated with `1..=D²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagicSumTarget {
    dimension: usize,
    value: f64,
}

impl MagicSumTarget {
    /// Computes `D·(D²+1)/2`.
    pub fn for_dimension(dimension: usize) -> Self {
        let d = dimension as f64;
        Self { dimension, value: d * (d * d + 1.0) / 2.0 }
    }

    /// The target line sum.
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The dimension this target was derived for.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The value each cell holds when the matrix is uniformly balanced.
    pub fn cell_mean(&self) -> f64 {
        self.value / self.dimension as f64
    }
}

/// Non-negative squared-deviation penalty; zero iff the matrix is exactly balanced.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BalancePenalty(f64);

impl BalancePenalty {
    /// Raw penalty value.
    #[inline]
    pub fn value(&self) -> f64 {
        self.0
    }

    /// True when every line sum hits the target exactly.
    pub fn is_balanced(&self) -> bool {
        self.0 == 0.0
    }
}

impl fmt::Display for BalancePenalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Per-line deviations behind a penalty, signed as `sum - target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    /// Target line sum.
    pub target: f64,
    /// Row deviations in row order.
    pub row_deviations: Vec<f64>,
    /// Column deviations in column order.
    pub column_deviations: Vec<f64>,
    /// Main diagonal deviation.
    pub main_diagonal_deviation: f64,
    /// Anti-diagonal deviation.
    pub anti_diagonal_deviation: f64,
    /// Total squared deviation.
    pub penalty: BalancePenalty,
}

impl BalanceReport {
    /// Computes every line deviation for `matrix`.
    pub fn compute(matrix: &SystemMatrix, target: MagicSumTarget) -> Self {
        let t = target.value();
        let row_deviations: Vec<f64> = matrix.row_sums().into_iter().map(|s| s - t).collect();
        let column_deviations: Vec<f64> = matrix.column_sums().into_iter().map(|s| s - t).collect();
        let main_diagonal_deviation = matrix.main_diagonal_sum() - t;
        let anti_diagonal_deviation = matrix.anti_diagonal_sum() - t;

        let total = row_deviations.iter().chain(&column_deviations).map(|d| d * d).sum::<f64>()
            + main_diagonal_deviation * main_diagonal_deviation
            + anti_diagonal_deviation * anti_diagonal_deviation;

        Self {
            target: t,
            row_deviations,
            column_deviations,
            main_diagonal_deviation,
            anti_diagonal_deviation,
            penalty: BalancePenalty(total),
        }
    }

    /// The line with the largest absolute deviation, as a label and value.
    pub fn worst_line(&self) -> (String, f64) {
        let mut worst = ("main-diagonal".to_string(), self.main_diagonal_deviation);
        let mut consider = |label: String, value: f64| {
            if value.abs() > worst.1.abs() {
                worst = (label, value);
            }
        };
        consider("anti-diagonal".to_string(), self.anti_diagonal_deviation);
        for (i, d) in self.row_deviations.iter().enumerate() {
            consider(format!("row-{i}"), *d);
        }
        for (i, d) in self.column_deviations.iter().enumerate() {
            consider(format!("col-{i}"), *d);
        }
        worst
    }
}

/// Sum of squared deviations of every row, column and both main diagonals from `target`.
///
/// Pure and total for any finite matrix.
pub fn penalty(matrix: &SystemMatrix, target: MagicSumTarget) -> BalancePenalty {
    let t = target.value();
    let lines = matrix
        .row_sums()
        .into_iter()
        .chain(matrix.column_sums())
        .chain([matrix.main_diagonal_sum(), matrix.anti_diagonal_sum()]);
    BalancePenalty(lines.map(|s| (s - t) * (s - t)).sum())
}

/// Analytic gradient of [`penalty`] with respect to every cell.
pub fn penalty_gradient(matrix: &SystemMatrix, target: MagicSumTarget) -> Array2<f64> {
    let report = BalanceReport::compute(matrix, target);
    let d = matrix.dimension();
    Array2::from_shape_fn((d, d), |(i, j)| {
        let mut g = 2.0 * (report.row_deviations[i] + report.column_deviations[j]);
        if i == j {
            g += 2.0 * report.main_diagonal_deviation;
        }
        if i + j == d - 1 {
            g += 2.0 * report.anti_diagonal_deviation;
        }
        g
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_magic_sum_targets() {
        assert_eq!(MagicSumTarget::for_dimension(3).value(), 15.0);
        assert_eq!(MagicSumTarget::for_dimension(4).value(), 34.0);
        assert_eq!(MagicSumTarget::for_dimension(5).value(), 65.0);
    }

    #[test]
    fn test_lo_shu_square_has_zero_penalty() {
        let m = SystemMatrix::from_rows(vec![
            vec![8.0, 1.0, 6.0],
            vec![3.0, 5.0, 7.0],
            vec![4.0, 9.0, 2.0],
        ])
        .unwrap();
        let p = penalty(&m, MagicSumTarget::for_dimension(3));
        assert_eq!(p.value(), 0.0);
        assert!(p.is_balanced());
    }

    #[test]
    fn test_penalty_is_not_normalized() {
        // Every one of the 2D+2 lines is off by exactly one.
        for d in 3..=6 {
            let target = MagicSumTarget::for_dimension(d);
            let m = SystemMatrix::filled(d, (target.value() + 1.0) / d as f64).unwrap();
            let p = penalty(&m, target).value();
            assert!((p - (2 * d + 2) as f64).abs() < 1e-9, "d={d} p={p}");
        }
    }

    #[test]
    fn test_report_matches_penalty_and_names_worst_line() {
        let mut m = SystemMatrix::filled(3, 5.0).unwrap();
        m[(0, 2)] = 9.0;
        let target = MagicSumTarget::for_dimension(3);
        let report = BalanceReport::compute(&m, target);
        assert_eq!(report.penalty, penalty(&m, target));
        assert_eq!(report.row_deviations[0], 4.0);
        assert_eq!(report.column_deviations[2], 4.0);
        assert_eq!(report.anti_diagonal_deviation, 4.0);
        assert_eq!(report.worst_line().1, 4.0);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let mut m = SystemMatrix::filled(4, 7.0).unwrap();
        m[(1, 2)] = 12.0;
        m[(3, 0)] = -1.0;
        let target = MagicSumTarget::for_dimension(4);
        let grad = penalty_gradient(&m, target);
        let h = 1e-5;
        for (i, j) in [(0, 0), (1, 2), (3, 0), (2, 1)] {
            let mut plus = m.clone();
            plus[(i, j)] += h;
            let mut minus = m.clone();
            minus[(i, j)] -= h;
            let numeric = (penalty(&plus, target).value() - penalty(&minus, target).value()) / (2.0 * h);
            assert!((numeric - grad[[i, j]]).abs() < 1e-4, "cell ({i},{j})");
        }
    }

    proptest! {
        #[test]
        fn prop_uniform_cell_mean_is_balanced(d in 3usize..12) {
            let target = MagicSumTarget::for_dimension(d);
            let m = SystemMatrix::filled(d, target.cell_mean()).unwrap();
            prop_assert!(penalty(&m, target).value() < 1e-12);
        }

        #[test]
        fn prop_penalty_is_non_negative(cells in proptest::collection::vec(-100.0f64..100.0, 16)) {
            let rows: Vec<Vec<f64>> = cells.chunks(4).map(|c| c.to_vec()).collect();
            let m = SystemMatrix::from_rows(rows).unwrap();
            prop_assert!(penalty(&m, MagicSumTarget::for_dimension(4)).value() >= 0.0);
        }
    }
}
