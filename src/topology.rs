/* src/topology.rs */
//! Static assignment of matrix sub-regions to local stabilizers.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::TopologySpec;
use crate::error::{LumistabError, Result};

/// A half-open rectangular block `[row_start, row_end) x [col_start, col_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// First row (inclusive).
    pub row_start: usize,
    /// Last row (exclusive).
    pub row_end: usize,
    /// First column (inclusive).
    pub col_start: usize,
    /// Last column (exclusive).
    pub col_end: usize,
}

impl Region {
    /// Creates a region from its half-open bounds.
    pub const fn new(row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Self {
        Self { row_start, row_end, col_start, col_end }
    }

    /// Number of rows covered.
    pub fn rows(&self) -> usize {
        self.row_end.saturating_sub(self.row_start)
    }

    /// Number of columns covered.
    pub fn cols(&self) -> usize {
        self.col_end.saturating_sub(self.col_start)
    }

    /// Number of cells covered.
    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    /// True when the region covers no cell.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `(row, col)` lies inside the region.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.row_start..self.row_end).contains(&row) && (self.col_start..self.col_end).contains(&col)
    }

    /// True when the two regions share at least one cell.
    pub fn intersects(&self, other: &Region) -> bool {
        self.row_start < other.row_end
            && other.row_start < self.row_end
            && self.col_start < other.col_end
            && other.col_start < self.col_end
    }

    /// Iterates every `(row, col)` inside the region in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.row_start..self.row_end).flat_map(move |r| (self.col_start..self.col_end).map(move |c| (r, c)))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}, {}..{}]", self.row_start, self.row_end, self.col_start, self.col_end)
    }
}

/// The fixed partitioning used by the distributed stabilizer.
///
/// Built once at construction and never re-derived per call. Partitions are expected
/// to be disjoint; when overlap is explicitly allowed, aggregation resolves shared
/// cells by partition index, the highest index writing last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    dimension: usize,
    regions: Vec<Region>,
}

impl Topology {
    /// Builds and validates the partitioning described by `spec`.
    pub fn build(dimension: usize, spec: &TopologySpec, allow_overlap: bool) -> Result<Self> {
        let regions = match spec {
            TopologySpec::Whole => vec![Region::new(0, dimension, 0, dimension)],
            TopologySpec::RowBands { count } => Self::bands(dimension, *count)?
                .into_iter()
                .map(|(start, end)| Region::new(start, end, 0, dimension))
                .collect(),
            TopologySpec::Blocks { rows, cols } => {
                let row_bands = Self::bands(dimension, *rows)?;
                let col_bands = Self::bands(dimension, *cols)?;
                row_bands
                    .iter()
                    .flat_map(|&(r0, r1)| col_bands.iter().map(move |&(c0, c1)| Region::new(r0, r1, c0, c1)))
                    .collect()
            }
            TopologySpec::Explicit { regions } => regions.clone(),
        };
        Self::from_regions(dimension, regions, allow_overlap)
    }

    /// Validates an explicit list of regions.
    pub fn from_regions(dimension: usize, regions: Vec<Region>, allow_overlap: bool) -> Result<Self> {
        if regions.is_empty() {
            return Err(LumistabError::Configuration("topology has no partitions".to_string()));
        }
        for (index, region) in regions.iter().enumerate() {
            if region.is_empty() || region.row_end > dimension || region.col_end > dimension {
                return Err(LumistabError::Configuration(format!(
                    "partition {index} {region} is empty or outside a {dimension}x{dimension} matrix"
                )));
            }
        }
        let topology = Self { dimension, regions };
        if !allow_overlap {
            if let Some((a, b)) = topology.first_overlap() {
                return Err(LumistabError::Configuration(format!(
                    "partitions {a} and {b} overlap; set allow_overlap to accept last-writer-wins aggregation"
                )));
            }
        }
        Ok(topology)
    }

    /// Dimension the topology was built for.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Regions in partition-index order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Always false for a validated topology.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// True when any two partitions share a cell.
    pub fn overlaps(&self) -> bool {
        self.first_overlap().is_some()
    }

    /// True when every cell belongs to at least one partition.
    pub fn covers_all(&self) -> bool {
        let covered: usize = (0..self.dimension)
            .flat_map(|r| (0..self.dimension).map(move |c| (r, c)))
            .filter(|&(r, c)| self.regions.iter().any(|region| region.contains(r, c)))
            .count();
        covered == self.dimension * self.dimension
    }

    fn first_overlap(&self) -> Option<(usize, usize)> {
        for (i, a) in self.regions.iter().enumerate() {
            for (j, b) in self.regions.iter().enumerate().skip(i + 1) {
                if a.intersects(b) {
                    return Some((i, j));
                }
            }
        }
        None
    }

    /// Splits `0..dimension` into `count` contiguous, near-equal bands.
    fn bands(dimension: usize, count: usize) -> Result<Vec<(usize, usize)>> {
        if count == 0 || count > dimension {
            return Err(LumistabError::Configuration(format!(
                "cannot split dimension {dimension} into {count} bands"
            )));
        }
        let base = dimension / count;
        let extra = dimension % count;
        let mut start = 0;
        Ok((0..count)
            .map(|i| {
                let len = base + usize::from(i < extra);
                let band = (start, start + len);
                start += len;
                band
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_bands_cover_disjointly() {
        let topology = Topology::build(7, &TopologySpec::RowBands { count: 3 }, false).unwrap();
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.regions()[0], Region::new(0, 3, 0, 7));
        assert_eq!(topology.regions()[1], Region::new(3, 5, 0, 7));
        assert_eq!(topology.regions()[2], Region::new(5, 7, 0, 7));
        assert!(topology.covers_all());
        assert!(!topology.overlaps());
    }

    #[test]
    fn test_block_grid() {
        let topology = Topology::build(4, &TopologySpec::Blocks { rows: 2, cols: 2 }, false).unwrap();
        assert_eq!(topology.len(), 4);
        assert_eq!(topology.regions()[3], Region::new(2, 4, 2, 4));
        assert!(topology.covers_all());
    }

    #[test]
    fn test_rejects_invalid_partitionings() {
        assert!(Topology::build(3, &TopologySpec::RowBands { count: 0 }, false).is_err());
        assert!(Topology::build(3, &TopologySpec::RowBands { count: 4 }, false).is_err());
        assert!(Topology::from_regions(3, vec![], false).is_err());
        assert!(Topology::from_regions(3, vec![Region::new(0, 4, 0, 3)], false).is_err());
        assert!(Topology::from_regions(3, vec![Region::new(1, 1, 0, 3)], false).is_err());
    }

    #[test]
    fn test_overlap_requires_opt_in() {
        let regions = vec![Region::new(0, 2, 0, 3), Region::new(1, 3, 0, 3)];
        let err = Topology::from_regions(3, regions.clone(), false).unwrap_err();
        assert!(matches!(err, LumistabError::Configuration(_)));
        let topology = Topology::from_regions(3, regions, true).unwrap();
        assert!(topology.overlaps());
    }

    #[test]
    fn test_partial_cover_is_detected() {
        let topology = Topology::from_regions(3, vec![Region::new(0, 1, 0, 3)], false).unwrap();
        assert!(!topology.covers_all());
        assert_eq!(Region::new(0, 2, 1, 3).cells().count(), 4);
    }
}
