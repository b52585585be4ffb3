/* src/engine.rs */
//! # Stabilization Engine
//!
//! The sequential per-cycle pipeline:
//!
//! ```text
//! snapshot ─▶ evaluate ─▶ monitor.observe ─▶ optimizer.step ─▶ publish ─▶ sink.apply
//! ```
//!
//! Cycle `N` is fully resolved before cycle `N + 1` starts. Per-cycle failures are
//! wrapped with the cycle index, the failing component and the policy in effect,
//! then counted and logged; they never stop a run. An invalid snapshot skips the
//! cycle and leaves every component's state untouched.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::balance::BalancePenalty;
use crate::boundary::{ApparatusSink, MetricsSource};
use crate::config::StabilizerConfig;
use crate::error::{Component, LumistabError, Result};
use crate::matrix::SystemMatrix;
use crate::monitor::{MetricsRecord, RealTimeMonitor};
use crate::objective::Objective;
use crate::optimizer::{AdaptiveOptimizer, OptimizationResult, OptimizerState};
use crate::snapshot::PerformanceSnapshot;
use crate::symmetry::SymmetryEvaluator;

/// Cycles spent in each optimizer state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCycles {
    /// Exploration cycles.
    pub exploration: u64,
    /// Exploitation cycles.
    pub exploitation: u64,
    /// Convergence cycles.
    pub convergence: u64,
    /// Recalibration cycles.
    pub recalibration: u64,
}

impl StateCycles {
    fn record(&mut self, state: OptimizerState) {
        match state {
            OptimizerState::Exploration => self.exploration += 1,
            OptimizerState::Exploitation => self.exploitation += 1,
            OptimizerState::Convergence => self.convergence += 1,
            OptimizerState::Recalibration => self.recalibration += 1,
        }
    }
}

/// Engine counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Cycles that produced a result.
    pub completed: u64,
    /// Cycles skipped because of an invalid snapshot.
    pub skipped: u64,
    /// Cycles whose stabilization failed.
    pub failed: u64,
    /// Monitor alerts raised.
    pub alerts: u64,
    /// Completed cycles per active state.
    pub state_cycles: StateCycles,
}

/// Outcome of [`StabilizationEngine::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub finished_at: DateTime<Utc>,
    /// Snapshots consumed.
    pub cycles: u64,
    /// Engine counters.
    pub stats: EngineStats,
    /// The run stopped because its cancellation token fired.
    pub cancelled: bool,
    /// Optimizer state at the end of the run.
    pub final_state: OptimizerState,
    /// Best candidate at the end of the run.
    pub best_matrix: SystemMatrix,
    /// Fitness of the best candidate.
    pub best_fitness: f64,
    /// Balance penalty of the best candidate.
    pub best_penalty: BalancePenalty,
    /// Fingerprint of the best candidate.
    pub best_fingerprint: String,
    /// Policy in effect.
    pub policy: String,
}

/// Owns the evaluator, monitor and optimizer and runs the control loop.
#[derive(Debug)]
pub struct StabilizationEngine {
    config: Arc<StabilizerConfig>,
    evaluator: SymmetryEvaluator,
    monitor: RealTimeMonitor,
    optimizer: AdaptiveOptimizer,
    cycle: u64,
    stats: EngineStats,
    last_result: ArcSwapOption<OptimizationResult>,
    cancel: CancellationToken,
    run_id: Uuid,
}

impl StabilizationEngine {
    /// Validates `config` and wires every component.
    pub fn new(config: StabilizerConfig, objective: Arc<dyn Objective>) -> Result<Self> {
        let config = Arc::new(config);
        let optimizer = AdaptiveOptimizer::new(Arc::clone(&config), objective)?;
        Ok(Self::assemble(config, optimizer))
    }

    /// Like [`StabilizationEngine::new`] but with an explicit first candidate.
    pub fn with_initial(config: StabilizerConfig, objective: Arc<dyn Objective>, initial: SystemMatrix) -> Result<Self> {
        let config = Arc::new(config);
        let optimizer = AdaptiveOptimizer::with_initial(Arc::clone(&config), objective, initial)?;
        Ok(Self::assemble(config, optimizer))
    }

    fn assemble(config: Arc<StabilizerConfig>, optimizer: AdaptiveOptimizer) -> Self {
        let run_id = Uuid::new_v4();
        info!(%run_id, policy = %config.policy_summary(), "stabilization engine ready");
        Self {
            evaluator: SymmetryEvaluator::new(config.weights),
            monitor: RealTimeMonitor::new(config.monitor.clone()),
            optimizer,
            cycle: 0,
            stats: EngineStats::default(),
            last_result: ArcSwapOption::empty(),
            cancel: CancellationToken::new(),
            run_id,
            config,
        }
    }

    /// Token that cancels the in-flight cycle and ends [`StabilizationEngine::run`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Last committed result, read without locking.
    pub fn last_result(&self) -> Option<Arc<OptimizationResult>> {
        self.last_result.load_full()
    }

    /// Engine counters.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Index of the most recent cycle.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Run identifier.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The anomaly monitor.
    pub fn monitor(&self) -> &RealTimeMonitor {
        &self.monitor
    }

    /// The optimizer.
    pub fn optimizer(&self) -> &AdaptiveOptimizer {
        &self.optimizer
    }

    /// Observes every committed optimizer state.
    pub fn subscribe_state(&self) -> watch::Receiver<OptimizerState> {
        self.optimizer.subscribe()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    fn wrap(&self, cycle: u64, component: Component, source: LumistabError) -> LumistabError {
        LumistabError::Cycle { cycle, component, policy: self.config.policy_summary(), source: Box::new(source) }
    }

    /// Runs one full cycle for `snapshot`.
    #[instrument(level = "debug", skip_all, fields(cycle = self.cycle + 1))]
    pub async fn run_cycle(&mut self, snapshot: &PerformanceSnapshot) -> Result<Arc<OptimizationResult>> {
        self.cycle += 1;
        let cycle = self.cycle;

        let breakdown = match self.evaluator.evaluate_detailed(snapshot) {
            Ok(breakdown) => breakdown,
            Err(error) => {
                self.stats.skipped += 1;
                counter!("engine_cycles_skipped").increment(1);
                return Err(self.wrap(cycle, Component::SymmetryEvaluator, error));
            }
        };

        let record = MetricsRecord::from_snapshot(cycle, snapshot, &breakdown);
        let alert = self.monitor.observe(record).await;
        if alert.is_some() {
            self.stats.alerts += 1;
        }

        match self.optimizer.step(cycle, breakdown.score, alert.as_ref(), &self.cancel).await {
            Ok(result) => {
                self.stats.completed += 1;
                self.stats.state_cycles.record(result.active_state);
                counter!("engine_cycles_completed").increment(1);
                let result = Arc::new(result);
                self.last_result.store(Some(Arc::clone(&result)));
                Ok(result)
            }
            Err(error) => {
                self.stats.failed += 1;
                counter!("engine_cycles_failed").increment(1);
                self.monitor.note_failure(cycle, &error).await;
                let component = error.stabilization_component();
                Err(self.wrap(cycle, component, error))
            }
        }
    }

    /// Drives `source` into `sink` until the source is exhausted, `max_cycles`
    /// snapshots were consumed, or the cancellation token fires.
    ///
    /// Recoverable cycle failures are logged and counted. Anything else, including
    /// a rejection by the sink, ends the run with an error.
    pub async fn run(
        &mut self,
        source: &mut dyn MetricsSource,
        sink: &mut dyn ApparatusSink,
        max_cycles: Option<u64>,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let mut cycles = 0u64;
        info!(run_id = %self.run_id, max_cycles, "run started");

        loop {
            if self.cancel.is_cancelled() || max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            let Some(snapshot) = source.next_snapshot() else {
                break;
            };
            cycles += 1;

            match self.run_cycle(&snapshot).await {
                Ok(result) => {
                    if let Err(error) = sink.apply(&result) {
                        return Err(self.wrap(result.cycle, Component::Apparatus, error));
                    }
                }
                Err(error) if error.is_recoverable() => {
                    warn!(error = %error, "cycle contained");
                }
                Err(error) => return Err(error),
            }
        }

        let cancelled = self.cancel.is_cancelled();
        let summary = RunSummary {
            run_id: self.run_id,
            started_at,
            finished_at: Utc::now(),
            cycles,
            stats: self.stats.clone(),
            cancelled,
            final_state: self.optimizer.state(),
            best_matrix: self.optimizer.best().clone(),
            best_fitness: self.optimizer.best_fitness(),
            best_penalty: self.optimizer.best_penalty(),
            best_fingerprint: self.optimizer.best().fingerprint(),
            policy: self.config.policy_summary(),
        };
        info!(
            run_id = %self.run_id,
            cycles,
            completed = summary.stats.completed,
            failed = summary.stats.failed,
            alerts = summary.stats.alerts,
            final_state = %summary.final_state,
            best_penalty = summary.best_penalty.value(),
            cancelled,
            "run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{RecordingSink, ReplaySource};
    use crate::objective::ZeroObjective;
    use crate::synthetic::SyntheticMetricsSource;

    fn steady(cycle: u64, first_energy: f64) -> PerformanceSnapshot {
        let t = cycle as f64;
        PerformanceSnapshot::new(
            t,
            vec![[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, -1.0, 0.0]],
            vec![first_energy, 10.0, 10.0, 10.0],
            vec![t - 3.0, t - 2.0, t - 1.0],
        )
    }

    fn engine() -> StabilizationEngine {
        StabilizationEngine::new(StabilizerConfig::default(), Arc::new(ZeroObjective)).unwrap()
    }

    #[tokio::test]
    async fn test_outlier_forces_recalibration_on_the_same_cycle() {
        let mut engine = engine();
        for cycle in 1..=8 {
            let result = engine.run_cycle(&steady(cycle, 10.0)).await.unwrap();
            assert_ne!(result.active_state, OptimizerState::Recalibration);
        }
        let result = engine.run_cycle(&steady(9, 1.0e6)).await.unwrap();
        assert_eq!(result.active_state, OptimizerState::Recalibration);
        assert_eq!(engine.stats().alerts, 1);
        assert_eq!(engine.monitor().alerts_raised(), 1);
        assert_eq!(engine.last_result().map(|r| r.cycle), Some(9));
    }

    #[tokio::test]
    async fn test_invalid_snapshot_skips_cycle_and_keeps_state() {
        let mut engine = engine();
        engine.run_cycle(&steady(1, 10.0)).await.unwrap();
        let best = engine.optimizer().best().clone();
        let history = engine.monitor().snapshot().await.len();

        let empty = PerformanceSnapshot::new(2.0, vec![], vec![10.0], vec![1.0]);
        let err = engine.run_cycle(&empty).await.unwrap_err();
        assert!(err.is_invalid_snapshot());
        assert!(err.is_recoverable());
        let message = err.to_string();
        assert!(message.contains("cycle 2"), "{message}");
        assert!(message.contains("symmetry-evaluator"), "{message}");
        assert!(message.contains("D=3"), "{message}");

        assert_eq!(engine.optimizer().best(), &best);
        assert_eq!(engine.monitor().snapshot().await.len(), history);
        assert_eq!(engine.stats().skipped, 1);
        assert_eq!(engine.last_result().map(|r| r.cycle), Some(1));
    }

    #[tokio::test]
    async fn test_partition_failure_is_attributed_and_contained() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        // finite for the initial candidate only
        let calls = AtomicUsize::new(0);
        let objective: Arc<dyn Objective> = Arc::new(move |_: &SystemMatrix| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 { 0.0 } else { f64::NAN }
        });
        let mut engine = StabilizationEngine::new(StabilizerConfig::default(), objective).unwrap();
        let best = engine.optimizer().best().clone();

        let err = engine.run_cycle(&steady(1, 10.0)).await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.failing_partition().is_some());
        assert!(err.to_string().contains("local-stabilizer"), "{err}");
        assert_eq!(engine.stats().failed, 1);
        assert_eq!(engine.monitor().failures_noted(), 1);
        assert_eq!(engine.optimizer().best(), &best);
        assert_eq!(engine.optimizer().state(), OptimizerState::Recalibration);
    }

    #[tokio::test]
    async fn test_run_drives_source_into_sink() {
        let mut engine = engine();
        let mut source = ReplaySource::new((1..=6).map(|c| steady(c, 10.0)));
        let mut sink = RecordingSink::new();
        let summary = engine.run(&mut source, &mut sink, None).await.unwrap();
        assert_eq!(summary.cycles, 6);
        assert_eq!(summary.stats.completed, 6);
        assert_eq!(sink.results().len(), 6);
        assert_eq!(summary.best_fingerprint, summary.best_matrix.fingerprint());
        let cycles: Vec<u64> = sink.results().iter().map(|r| r.cycle).collect();
        assert_eq!(cycles, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_run_respects_max_cycles_and_cancellation() {
        let mut engine = engine();
        let mut source = SyntheticMetricsSource::new(5);
        let mut sink = RecordingSink::new();
        let summary = engine.run(&mut source, &mut sink, Some(4)).await.unwrap();
        assert_eq!(summary.cycles, 4);
        assert!(!summary.cancelled);

        engine.cancellation_token().cancel();
        let summary = engine.run(&mut source, &mut sink, Some(4)).await.unwrap();
        assert_eq!(summary.cycles, 0);
        assert!(summary.cancelled);
    }

    #[tokio::test]
    async fn test_sink_rejection_ends_the_run() {
        use crate::apparatus::ApparatusController;
        use crate::config::ApparatusLimits;

        let mut engine = engine();
        let mut source = ReplaySource::new(vec![steady(1, 10.0)]);
        // powered off, so every result is rejected
        let mut apparatus = ApparatusController::new(ApparatusLimits::default());
        let err = engine.run(&mut source, &mut apparatus, None).await.unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("apparatus"));
    }
}
