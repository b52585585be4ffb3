/* src/config.rs */
//! # Stabilizer Configuration
//!
//! Every policy constant of the control loop lives in one injected
//! [`StabilizerConfig`]. `Default` carries the tuned constants; loading from JSON or
//! YAML always validates, and validation failure is fatal before the first cycle.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LumistabError, Result};
use crate::matrix::MIN_DIMENSION;
use crate::monitor::MetricChannel;
use crate::topology::{Region, Topology};

/// How the global matrix is split across local stabilizers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    /// One partition covering the whole matrix.
    Whole,
    /// `count` horizontal bands spanning every column.
    RowBands {
        /// Number of bands.
        count: usize,
    },
    /// A `rows x cols` grid of blocks.
    Blocks {
        /// Number of block rows.
        rows: usize,
        /// Number of block columns.
        cols: usize,
    },
    /// Hand-written regions, in partition-index order.
    Explicit {
        /// Half-open regions.
        regions: Vec<Region>,
    },
}

impl std::fmt::Display for TopologySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologySpec::Whole => write!(f, "whole"),
            TopologySpec::RowBands { count } => write!(f, "row_bands({count})"),
            TopologySpec::Blocks { rows, cols } => write!(f, "blocks({rows}x{cols})"),
            TopologySpec::Explicit { regions } => write!(f, "explicit({})", regions.len()),
        }
    }
}

/// Sub-score weights of the symmetry evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymmetryWeights {
    /// Weight of timing irregularity.
    pub temporal: f64,
    /// Weight of positional dispersion.
    pub spatial: f64,
    /// Weight of paired energy imbalance.
    pub energy: f64,
}

impl Default for SymmetryWeights {
    fn default() -> Self {
        Self { temporal: 0.4, spatial: 0.3, energy: 0.3 }
    }
}

/// Exploration state parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationParams {
    /// Cycles spent exploring before handing over to exploitation.
    pub max_iterations: u32,
    /// Per-cell perturbation probability, also scaling the perturbation width.
    pub exploration_rate: f64,
    /// Candidates sampled per cycle.
    pub population: usize,
}

impl Default for ExplorationParams {
    fn default() -> Self {
        Self { max_iterations: 20, exploration_rate: 0.3, population: 8 }
    }
}

/// Exploitation state parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploitationParams {
    /// Cycles spent refining before returning to exploration.
    pub max_iterations: u32,
    /// Gradient step size.
    pub learning_rate: f64,
}

impl Default for ExploitationParams {
    fn default() -> Self {
        Self { max_iterations: 15, learning_rate: 0.1 }
    }
}

/// Convergence detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceParams {
    /// Maximum score spread over the stability window.
    pub tolerance: f64,
    /// Number of consecutive scores inspected.
    pub stability_window: usize,
}

impl Default for ConvergenceParams {
    fn default() -> Self {
        Self { tolerance: 1e-6, stability_window: 10 }
    }
}

/// Recalibration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalibrationParams {
    /// Cycle-over-cycle score increase that forces recalibration.
    pub reset_threshold: f64,
    /// Weight of the best-known candidate in the recalibration blend.
    pub memory_weight: f64,
}

impl Default for RecalibrationParams {
    fn default() -> Self {
        Self { reset_threshold: 0.1, memory_weight: 0.8 }
    }
}

/// Thresholds that send a settled machine back to exploration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionPolicy {
    /// Score variance above which the landscape counts as under-sampled.
    pub variance_threshold: f64,
    /// Number of recent scores the variance is taken over.
    pub variance_window: usize,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self { variance_threshold: 0.05, variance_window: 5 }
    }
}

/// Bounded hill-climb parameters for each local stabilizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSearchParams {
    /// Hard bound on proposals per partition per cycle.
    pub max_iterations: u32,
    /// Initial perturbation step.
    pub step_size: f64,
    /// Search stops once the step shrinks below this.
    pub min_step: f64,
    /// Consecutive rejected proposals before the step is halved.
    pub stall_limit: u32,
}

impl Default for LocalSearchParams {
    fn default() -> Self {
        Self { max_iterations: 200, step_size: 1.0, min_step: 1e-3, stall_limit: 20 }
    }
}

/// Real-time monitor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorParams {
    /// Bounded history capacity.
    pub capacity: usize,
    /// Most recent records used for the rolling mean and deviation.
    pub statistics_window: usize,
    /// Records required before deviation checks start.
    pub min_samples: usize,
    /// Deviation, in standard deviations, that raises an alert.
    pub sigma_limit: f64,
    /// Floor of the standard deviation relative to `max(|mean|, 1)`.
    pub relative_sigma_floor: f64,
    /// Longest tolerated run of consecutive score increases.
    pub max_degradation_run: usize,
    /// Channels checked for deviations.
    pub channels: Vec<MetricChannel>,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            capacity: 1000,
            statistics_window: 100,
            min_samples: 5,
            sigma_limit: 3.0,
            relative_sigma_floor: 1e-3,
            max_degradation_run: 5,
            channels: vec![MetricChannel::SymmetryScore, MetricChannel::EnergyTotal, MetricChannel::EnergyPeak],
        }
    }
}

/// Operating envelope of the emission apparatus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApparatusLimits {
    /// Emission wavelength in metres.
    pub wavelength_m: f64,
    /// Maximum output power in watts.
    pub max_power_w: f64,
    /// Relative output stability the apparatus is tuned for.
    pub stability_target: f64,
}

impl Default for ApparatusLimits {
    fn default() -> Self {
        Self { wavelength_m: 5.8e-9, max_power_w: 5.0e-9, stability_target: 0.01 }
    }
}

/// Complete configuration injected into every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Matrix dimension `D`.
    pub dimension: usize,
    /// Partitioning of the matrix across local stabilizers.
    pub topology: TopologySpec,
    /// Accept overlapping partitions (last writer by partition index wins).
    pub allow_overlap: bool,
    /// Symmetry sub-score weights.
    pub weights: SymmetryWeights,
    /// Exploration parameters.
    pub exploration: ExplorationParams,
    /// Exploitation parameters.
    pub exploitation: ExploitationParams,
    /// Convergence parameters.
    pub convergence: ConvergenceParams,
    /// Recalibration parameters.
    pub recalibration: RecalibrationParams,
    /// Return-to-exploration policy.
    pub transition: TransitionPolicy,
    /// Local search parameters.
    pub local: LocalSearchParams,
    /// Monitor parameters.
    pub monitor: MonitorParams,
    /// Barrier timeout for one stabilization pass.
    pub barrier_timeout_ms: u64,
    /// Base seed for every derived RNG.
    pub seed: u64,
    /// Upper bound on blocking threads used by partition tasks.
    pub max_blocking_threads: usize,
    /// Apparatus envelope.
    pub apparatus: ApparatusLimits,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            dimension: 3,
            topology: TopologySpec::RowBands { count: 3 },
            allow_overlap: false,
            weights: SymmetryWeights::default(),
            exploration: ExplorationParams::default(),
            exploitation: ExploitationParams::default(),
            convergence: ConvergenceParams::default(),
            recalibration: RecalibrationParams::default(),
            transition: TransitionPolicy::default(),
            local: LocalSearchParams::default(),
            monitor: MonitorParams::default(),
            barrier_timeout_ms: 5_000,
            seed: 0x1337_CAFE_BABE_FEED,
            max_blocking_threads: num_cpus::get().max(1),
            apparatus: ApparatusLimits::default(),
        }
    }
}

fn config_err(message: String) -> LumistabError {
    LumistabError::Configuration(message)
}

fn check_unit_rate(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(config_err(format!("{name} must be in (0, 1], got {value}")));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(config_err(format!("{name} must be > 0, got {value}")));
    }
    Ok(())
}

impl StabilizerConfig {
    /// Validate every policy constant.
    pub fn validate(&self) -> Result<()> {
        if self.dimension < MIN_DIMENSION {
            return Err(config_err(format!(
                "dimension must be >= {MIN_DIMENSION}, got {}",
                self.dimension
            )));
        }
        self.build_topology()?;

        let w = self.weights;
        if [w.temporal, w.spatial, w.energy].iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(config_err(format!("symmetry weights must be non-negative, got {w:?}")));
        }
        let total = w.temporal + w.spatial + w.energy;
        if (total - 1.0).abs() > 1e-9 {
            return Err(config_err(format!(
                "symmetry weights must sum to 1.0, got {} + {} + {} = {total}",
                w.temporal, w.spatial, w.energy
            )));
        }

        if self.exploration.max_iterations == 0 || self.exploitation.max_iterations == 0 {
            return Err(config_err("state max_iterations must be >= 1".to_string()));
        }
        if self.exploration.population == 0 {
            return Err(config_err("exploration population must be >= 1".to_string()));
        }
        check_unit_rate("exploration_rate", self.exploration.exploration_rate)?;
        check_unit_rate("learning_rate", self.exploitation.learning_rate)?;
        check_unit_rate("memory_weight", self.recalibration.memory_weight)?;
        check_positive("tolerance", self.convergence.tolerance)?;
        check_positive("reset_threshold", self.recalibration.reset_threshold)?;
        check_positive("variance_threshold", self.transition.variance_threshold)?;
        if self.convergence.stability_window < 2 {
            return Err(config_err(format!(
                "stability_window must be >= 2, got {}",
                self.convergence.stability_window
            )));
        }
        if self.transition.variance_window < 2 {
            return Err(config_err(format!(
                "variance_window must be >= 2, got {}",
                self.transition.variance_window
            )));
        }

        let local = self.local;
        if local.max_iterations == 0 || local.stall_limit == 0 {
            return Err(config_err("local max_iterations and stall_limit must be >= 1".to_string()));
        }
        check_positive("local step_size", local.step_size)?;
        check_positive("local min_step", local.min_step)?;
        if local.min_step > local.step_size {
            return Err(config_err(format!(
                "local min_step {} exceeds step_size {}",
                local.min_step, local.step_size
            )));
        }

        let monitor = &self.monitor;
        if monitor.capacity == 0 || monitor.statistics_window == 0 {
            return Err(config_err("monitor capacity and statistics_window must be >= 1".to_string()));
        }
        if monitor.capacity < monitor.statistics_window {
            return Err(config_err(format!(
                "monitor capacity {} is smaller than statistics_window {}",
                monitor.capacity, monitor.statistics_window
            )));
        }
        if monitor.min_samples < 2 || monitor.min_samples > monitor.statistics_window {
            return Err(config_err(format!(
                "monitor min_samples must be in [2, statistics_window], got {}",
                monitor.min_samples
            )));
        }
        check_positive("sigma_limit", monitor.sigma_limit)?;
        check_positive("relative_sigma_floor", monitor.relative_sigma_floor)?;
        if monitor.max_degradation_run == 0 {
            return Err(config_err("max_degradation_run must be >= 1".to_string()));
        }

        if self.barrier_timeout_ms == 0 {
            return Err(config_err("barrier_timeout_ms must be > 0".to_string()));
        }
        if self.max_blocking_threads == 0 {
            return Err(config_err("max_blocking_threads must be >= 1".to_string()));
        }
        check_positive("apparatus wavelength_m", self.apparatus.wavelength_m)?;
        check_positive("apparatus max_power_w", self.apparatus.max_power_w)?;
        check_positive("apparatus stability_target", self.apparatus.stability_target)?;
        Ok(())
    }

    /// Builds the validated static topology.
    pub fn build_topology(&self) -> Result<Topology> {
        Topology::build(self.dimension, &self.topology, self.allow_overlap)
    }

    /// Load from a JSON string and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| config_err(format!("JSON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML string and validate.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| config_err(format!("YAML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or JSON file and validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    /// One-line summary of the policy in effect, attached to every cycle failure.
    pub fn policy_summary(&self) -> String {
        format!(
            "D={} topology={} weights={}/{}/{} explore={}@{} exploit={}@{} converge={:e}/{} recal={}/{} seed={:#x}",
            self.dimension,
            self.topology,
            self.weights.temporal,
            self.weights.spatial,
            self.weights.energy,
            self.exploration.max_iterations,
            self.exploration.exploration_rate,
            self.exploitation.max_iterations,
            self.exploitation.learning_rate,
            self.convergence.tolerance,
            self.convergence.stability_window,
            self.recalibration.reset_threshold,
            self.recalibration.memory_weight,
            self.seed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = StabilizerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exploration.max_iterations, 20);
        assert_eq!(config.exploitation.learning_rate, 0.1);
        assert_eq!(config.convergence.stability_window, 10);
        assert_eq!(config.recalibration.memory_weight, 0.8);
        assert_eq!(config.monitor.capacity, 1000);
    }

    #[test]
    fn test_validation_failures() {
        let cases: Vec<Box<dyn Fn(&mut StabilizerConfig)>> = vec![
            Box::new(|c| c.dimension = 2),
            Box::new(|c| c.topology = TopologySpec::RowBands { count: 0 }),
            Box::new(|c| c.topology = TopologySpec::Explicit { regions: vec![] }),
            Box::new(|c| c.weights.temporal = 0.5),
            Box::new(|c| c.exploration.exploration_rate = 0.0),
            Box::new(|c| c.exploitation.max_iterations = 0),
            Box::new(|c| c.convergence.tolerance = 0.0),
            Box::new(|c| c.monitor.capacity = 10),
            Box::new(|c| c.barrier_timeout_ms = 0),
            Box::new(|c| {
                c.topology = TopologySpec::Explicit {
                    regions: vec![Region::new(0, 2, 0, 3), Region::new(1, 3, 0, 3)],
                }
            }),
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut config = StabilizerConfig::default();
            mutate(&mut config);
            let err = config.validate().unwrap_err();
            assert!(matches!(err, LumistabError::Configuration(_)), "case {i}: {err}");
            assert!(!err.is_recoverable());
        }
    }

    #[test]
    fn test_overlap_opt_in_validates() {
        let config = StabilizerConfig {
            allow_overlap: true,
            topology: TopologySpec::Explicit {
                regions: vec![Region::new(0, 2, 0, 3), Region::new(1, 3, 0, 3)],
            },
            ..StabilizerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StabilizerConfig::from_json_str(
            r#"{"dimension": 4, "topology": {"kind": "blocks", "rows": 2, "cols": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.dimension, 4);
        assert_eq!(config.build_topology().unwrap().len(), 4);
        assert_eq!(config.exploration.population, 8);
        assert!(StabilizerConfig::from_json_str(r#"{"dimension": 1}"#).is_err());
    }

    #[test]
    fn test_nested_sections_accept_partial_overrides() {
        let config = StabilizerConfig::from_json_str(
            r#"{"exploration": {"max_iterations": 30}, "monitor": {"sigma_limit": 4.0}}"#,
        )
        .unwrap();
        assert_eq!(config.exploration.max_iterations, 30);
        assert_eq!(config.exploration.exploration_rate, 0.3);
        assert_eq!(config.exploration.population, 8);
        assert_eq!(config.monitor.sigma_limit, 4.0);
        assert_eq!(config.monitor.capacity, 1000);

        let yaml = StabilizerConfig::from_yaml_str("local:\n  stall_limit: 7\n").unwrap();
        assert_eq!(yaml.local.stall_limit, 7);
        assert_eq!(yaml.local.max_iterations, 200);
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let config = StabilizerConfig { dimension: 5, seed: 99, ..StabilizerConfig::default() };
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(serde_yaml::to_string(&config).unwrap().as_bytes()).unwrap();
        let loaded = StabilizerConfig::from_path(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_policy_summary_mentions_constants() {
        let summary = StabilizerConfig::default().policy_summary();
        assert!(summary.contains("D=3"));
        assert!(summary.contains("row_bands(3)"));
        assert!(summary.contains("explore=20@0.3"));
    }
}
