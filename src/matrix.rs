/* src/matrix.rs */
//! Square configuration matrix describing one candidate operating point.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::ops::{Index, IndexMut};

use ndarray::{s, Array2, ArrayView2};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::error::{LumistabError, Result};
use crate::topology::Region;

/// Smallest supported matrix dimension.
pub const MIN_DIMENSION: usize = 3;

/// A square numeric matrix of fixed dimension `D >= 3`.
///
/// The matrix is a plain value: every handoff between components is a clone, so no
/// two components ever alias the same storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct SystemMatrix {
    cells: Array2<f64>,
}

impl SystemMatrix {
    /// Wraps an `ndarray` array, checking squareness and the minimum dimension.
    pub fn new(cells: Array2<f64>) -> Result<Self> {
        let (rows, cols) = cells.dim();
        if rows != cols {
            return Err(LumistabError::InvalidInput(format!(
                "system matrix must be square, got {rows}x{cols}"
            )));
        }
        if rows < MIN_DIMENSION {
            return Err(LumistabError::InvalidInput(format!(
                "system matrix dimension must be >= {MIN_DIMENSION}, got {rows}"
            )));
        }
        Ok(Self { cells })
    }

    /// Builds a matrix from row vectors.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let dimension = rows.len();
        if let Some(bad) = rows.iter().position(|row| row.len() != dimension) {
            return Err(LumistabError::InvalidInput(format!(
                "row {bad} has {} entries, expected {dimension}",
                rows[bad].len()
            )));
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let cells = Array2::from_shape_vec((dimension, dimension), flat)
            .map_err(|e| LumistabError::InvalidInput(e.to_string()))?;
        Self::new(cells)
    }

    /// Matrix with every cell set to `value`.
    pub fn filled(dimension: usize, value: f64) -> Result<Self> {
        Self::new(Array2::from_elem((dimension, dimension), value))
    }

    /// A random arrangement of `1..=D²`, the canonical fresh starting point.
    pub fn random_permutation<R: Rng + ?Sized>(dimension: usize, rng: &mut R) -> Result<Self> {
        let mut values: Vec<f64> = (1..=dimension * dimension).map(|v| v as f64).collect();
        values.shuffle(rng);
        let cells = Array2::from_shape_vec((dimension, dimension), values)
            .map_err(|e| LumistabError::InvalidInput(e.to_string()))?;
        Self::new(cells)
    }

    /// The dimension `D`.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.cells.nrows()
    }

    /// Read-only view over the cells.
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.cells.view()
    }

    /// Sum of every row, in row order.
    pub fn row_sums(&self) -> Vec<f64> {
        self.cells.rows().into_iter().map(|row| row.sum()).collect()
    }

    /// Sum of every column, in column order.
    pub fn column_sums(&self) -> Vec<f64> {
        self.cells.columns().into_iter().map(|col| col.sum()).collect()
    }

    /// Sum of the main (top-left to bottom-right) diagonal.
    pub fn main_diagonal_sum(&self) -> f64 {
        self.cells.diag().sum()
    }

    /// Sum of the anti-diagonal (top-right to bottom-left).
    pub fn anti_diagonal_sum(&self) -> f64 {
        let d = self.dimension();
        (0..d).map(|i| self.cells[[i, d - 1 - i]]).sum()
    }

    /// True when every cell is finite.
    pub fn is_finite(&self) -> bool {
        self.cells.iter().all(|v| v.is_finite())
    }

    /// Copies the cells inside `region`.
    pub fn region(&self, region: &Region) -> Result<Array2<f64>> {
        self.check_region(region)?;
        Ok(self
            .cells
            .slice(s![region.row_start..region.row_end, region.col_start..region.col_end])
            .to_owned())
    }

    /// Overwrites the cells inside `region` with `block`.
    pub fn write_region(&mut self, region: &Region, block: &Array2<f64>) -> Result<()> {
        self.check_region(region)?;
        if block.dim() != (region.rows(), region.cols()) {
            return Err(LumistabError::InvalidInput(format!(
                "block shape {:?} does not match region {region}",
                block.dim()
            )));
        }
        self.cells
            .slice_mut(s![region.row_start..region.row_end, region.col_start..region.col_end])
            .assign(block);
        Ok(())
    }

    /// Cell-wise `weight * self + (1 - weight) * other`.
    pub fn blend(&self, other: &SystemMatrix, weight: f64) -> Result<Self> {
        if other.dimension() != self.dimension() {
            let (a, b) = (self.dimension(), other.dimension());
            return Err(LumistabError::InvalidInput(format!("cannot blend {a}x{a} with {b}x{b}")));
        }
        let cells = &self.cells * weight + &other.cells * (1.0 - weight);
        Ok(Self { cells })
    }

    /// Short content hash used to identify a candidate in logs and results.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.dimension() as u64).to_le_bytes());
        for value in &self.cells {
            hasher.update(&value.to_le_bytes());
        }
        let hex = hasher.finalize().to_hex();
        hex.as_str()[..16].to_string()
    }

    /// Rows as nested vectors.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.cells.rows().into_iter().map(|row| row.to_vec()).collect()
    }

    fn check_region(&self, region: &Region) -> Result<()> {
        let d = self.dimension();
        if region.row_end > d || region.col_end > d || region.is_empty() {
            return Err(LumistabError::InvalidInput(format!(
                "region {region} is empty or outside a {d}x{d} matrix"
            )));
        }
        Ok(())
    }
}

impl Index<(usize, usize)> for SystemMatrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.cells[[row, col]]
    }
}

impl IndexMut<(usize, usize)> for SystemMatrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        &mut self.cells[[row, col]]
    }
}

impl TryFrom<Vec<Vec<f64>>> for SystemMatrix {
    type Error = LumistabError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        Self::from_rows(rows)
    }
}

impl From<SystemMatrix> for Vec<Vec<f64>> {
    fn from(matrix: SystemMatrix) -> Self {
        matrix.to_rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn lo_shu() -> SystemMatrix {
        SystemMatrix::from_rows(vec![
            vec![8.0, 1.0, 6.0],
            vec![3.0, 5.0, 7.0],
            vec![4.0, 9.0, 2.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_rejects_non_square_and_small() {
        assert!(SystemMatrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]]).is_err());
        assert!(SystemMatrix::filled(2, 1.0).is_err());
        assert!(SystemMatrix::from_rows(vec![vec![1.0; 3], vec![1.0; 2], vec![1.0; 3]]).is_err());
    }

    #[test]
    fn test_line_sums() {
        let m = lo_shu();
        assert_eq!(m.row_sums(), vec![15.0; 3]);
        assert_eq!(m.column_sums(), vec![15.0; 3]);
        assert_eq!(m.main_diagonal_sum(), 15.0);
        assert_eq!(m.anti_diagonal_sum(), 15.0);
    }

    #[test]
    fn test_region_round_trip() {
        let mut m = lo_shu();
        let region = Region::new(1, 3, 0, 2);
        let block = m.region(&region).unwrap();
        assert_eq!(block.dim(), (2, 2));
        assert_eq!(block[[0, 0]], 3.0);

        let zeros = Array2::zeros((2, 2));
        m.write_region(&region, &zeros).unwrap();
        assert_eq!(m[(1, 0)], 0.0);
        assert_eq!(m[(2, 1)], 0.0);
        assert_eq!(m[(0, 0)], 8.0);

        assert!(m.region(&Region::new(0, 4, 0, 1)).is_err());
        assert!(m.write_region(&region, &Array2::zeros((1, 2))).is_err());
    }

    #[test]
    fn test_blend_weights() {
        let a = SystemMatrix::filled(3, 10.0).unwrap();
        let b = SystemMatrix::filled(3, 0.0).unwrap();
        let mixed = a.blend(&b, 0.8).unwrap();
        assert!((mixed[(2, 2)] - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_random_permutation_uses_each_value_once() {
        let mut rng = StdRng::seed_from_u64(11);
        let m = SystemMatrix::random_permutation(4, &mut rng).unwrap();
        let mut values: Vec<f64> = m.view().iter().copied().collect();
        values.sort_by(f64::total_cmp);
        let expected: Vec<f64> = (1..=16).map(|v| v as f64).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_serde_as_rows_and_fingerprint() {
        let m = lo_shu();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "[[8.0,1.0,6.0],[3.0,5.0,7.0],[4.0,9.0,2.0]]");
        let back: SystemMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fingerprint(), m.fingerprint());
        assert_eq!(m.fingerprint().len(), 16);
        assert!(serde_json::from_str::<SystemMatrix>("[[1.0,2.0],[3.0,4.0]]").is_err());
    }
}
