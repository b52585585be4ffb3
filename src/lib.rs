/* src/lib.rs */
#![warn(missing_docs)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
//! # Lumistab: Adaptive Optimization & Stabilization Control Loop
//!
//! Drives a simulated light-source apparatus toward a stable, balanced operating
//! point. Each cycle consumes a performance snapshot, scores its symmetry, lets a
//! four-state adaptive optimizer propose a candidate configuration matrix, and
//! balances that candidate with a pool of concurrent local stabilizers before the
//! result is handed to the apparatus.
//!
//! ## Core Components
//!
//! - Symmetry evaluation of performance snapshots
//! - Magic-sum balance penalty engine
//! - Partitioned, barrier-synchronized distributed stabilizer
//! - Exploration / Exploitation / Convergence / Recalibration state machine
//! - Bounded real-time anomaly monitor with forced recovery
//!
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

#[macro_use]
pub mod telemetry;

pub mod apparatus;
pub mod balance;
pub mod boundary;
pub mod config;
pub mod distributed;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod local;
pub mod matrix;
pub mod monitor;
pub mod objective;
pub mod optimizer;
pub mod snapshot;
pub mod symmetry;
pub mod synthetic;
pub mod topology;

pub use apparatus::{ApparatusController, ApparatusEvent, ApparatusState, EmissionParameters, OutputMode};
pub use balance::{penalty, BalancePenalty, BalanceReport, MagicSumTarget};
pub use boundary::{ApparatusSink, MetricsSource, RecordingSink, ReplaySource};
pub use config::{StabilizerConfig, TopologySpec};
pub use distributed::DistributedStabilizer;
pub use engine::{EngineStats, RunSummary, StabilizationEngine};
pub use error::{Component, LumistabError, Result};
pub use local::LocalStabilizer;
pub use matrix::SystemMatrix;
pub use monitor::{Alert, AlertKind, MetricChannel, MetricsRecord, RealTimeMonitor};
pub use objective::{Objective, ZeroObjective};
pub use optimizer::{transition, AdaptiveOptimizer, OptimizationResult, OptimizerState, TransitionContext};
pub use snapshot::{PerformanceSnapshot, Position};
pub use symmetry::{SymmetryBreakdown, SymmetryEvaluator, SymmetryScore};
pub use topology::{Region, Topology};
