/* src/optimizer.rs */
//! # Adaptive Optimizer
//!
//! A four-state machine that drives the search for a balanced configuration:
//!
//! | State          | Behaviour                                                      |
//! |----------------|----------------------------------------------------------------|
//! | Exploration    | parallel population of random perturbations, fittest kept      |
//! | Exploitation   | gradient step on the balance penalty around the best candidate |
//! | Convergence    | holds the best candidate                                       |
//! | Recalibration  | blends the best candidate with a fresh permutation             |
//!
//! The transition logic is the pure function [`transition`]. The
//! [`AdaptiveOptimizer`] holds the single active state, the best-known candidate
//! and the recent score history. Every committed state is published on a `watch`
//! channel, so observers only ever see whole transitions.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::balance::{penalty, penalty_gradient, BalancePenalty, MagicSumTarget};
use crate::config::{ExplorationParams, StabilizerConfig};
use crate::distributed::DistributedStabilizer;
use crate::error::{LumistabError, Result};
use crate::hashing::derive_seed;
use crate::matrix::SystemMatrix;
use crate::monitor::Alert;
use crate::objective::Objective;
use crate::symmetry::SymmetryScore;

// Seed-path discriminators for the per-state RNGs.
const SEED_INITIAL: u64 = 0;
const SEED_EXPLORATION: u64 = 1;
const SEED_RECALIBRATION: u64 = 2;

// =====================================================================================
// STATE MACHINE
// =====================================================================================

/// The active search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerState {
    /// Broad, high-variance search.
    #[default]
    Exploration,
    /// Local refinement around the best candidate.
    Exploitation,
    /// Stable operating point; the best candidate is held.
    Convergence,
    /// Recovery after an anomaly, divergence or failed stabilization.
    Recalibration,
}

impl OptimizerState {
    /// Every state, in declaration order.
    pub const ALL: [OptimizerState; 4] = [
        OptimizerState::Exploration,
        OptimizerState::Exploitation,
        OptimizerState::Convergence,
        OptimizerState::Recalibration,
    ];
}

impl fmt::Display for OptimizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptimizerState::Exploration => "exploration",
            OptimizerState::Exploitation => "exploitation",
            OptimizerState::Convergence => "convergence",
            OptimizerState::Recalibration => "recalibration",
        };
        f.write_str(name)
    }
}

/// Everything the transition function looks at.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    /// Recent symmetry scores, oldest first, including the current cycle.
    pub scores: &'a [f64],
    /// Cycles already completed in the current state, not counting the current one.
    pub iterations_in_state: u32,
    /// The monitor raised an alert this cycle.
    pub alert: bool,
    /// The previous stabilization pass failed.
    pub partition_failure: bool,
}

fn tail(scores: &[f64], n: usize) -> Option<&[f64]> {
    (scores.len() >= n).then(|| &scores[scores.len() - n..])
}

fn spread(window: &[f64]) -> f64 {
    let (lo, hi) = window
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    hi - lo
}

fn variance(window: &[f64]) -> f64 {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Pure transition function of the optimizer state machine.
///
/// Rules, highest priority first:
///
/// 1. alert, pending partition failure, or a cycle-over-cycle score increase above
///    `reset_threshold` → Recalibration
/// 2. spread of the last `stability_window` scores within `tolerance` → Convergence
/// 3. from Convergence or Recalibration, variance of the last `variance_window`
///    scores above `variance_threshold` → Exploration
/// 4. Recalibration otherwise → Exploitation
/// 5. Exploration after `max_iterations` cycles → Exploitation
/// 6. Exploitation after `max_iterations` cycles → Exploration
/// 7. otherwise the current state is kept
pub fn transition(current: OptimizerState, ctx: &TransitionContext<'_>, config: &StabilizerConfig) -> OptimizerState {
    let degradation = match ctx.scores {
        [.., previous, latest] => latest - previous,
        _ => 0.0,
    };
    if ctx.alert || ctx.partition_failure || degradation > config.recalibration.reset_threshold {
        return OptimizerState::Recalibration;
    }

    if let Some(window) = tail(ctx.scores, config.convergence.stability_window) {
        if spread(window) <= config.convergence.tolerance {
            return OptimizerState::Convergence;
        }
    }

    let unsettled = tail(ctx.scores, config.transition.variance_window)
        .is_some_and(|window| variance(window) > config.transition.variance_threshold);

    match current {
        OptimizerState::Convergence | OptimizerState::Recalibration if unsettled => OptimizerState::Exploration,
        OptimizerState::Recalibration => OptimizerState::Exploitation,
        OptimizerState::Exploration if ctx.iterations_in_state >= config.exploration.max_iterations => {
            OptimizerState::Exploitation
        }
        OptimizerState::Exploitation if ctx.iterations_in_state >= config.exploitation.max_iterations => {
            OptimizerState::Exploration
        }
        state => state,
    }
}

// =====================================================================================
// RESULTS
// =====================================================================================

/// The unit handed to the apparatus boundary once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Engine cycle index.
    pub cycle: u64,
    /// Best candidate known after this cycle.
    pub matrix: SystemMatrix,
    /// Symmetry score measured this cycle.
    pub score: SymmetryScore,
    /// Balance penalty of `matrix`.
    pub penalty: BalancePenalty,
    /// State that produced `matrix`.
    pub state: OptimizerState,
    /// State active during this cycle.
    pub active_state: OptimizerState,
    /// `objective + penalty` of `matrix`.
    pub fitness: f64,
    /// Whether this cycle replaced the best candidate.
    pub improved: bool,
    /// Content hash of `matrix`.
    pub fingerprint: String,
    /// Wall-clock commit time.
    pub timestamp: DateTime<Utc>,
}

// =====================================================================================
// OPTIMIZER
// =====================================================================================

/// Owner of the active state and the best-known candidate.
pub struct AdaptiveOptimizer {
    config: Arc<StabilizerConfig>,
    target: MagicSumTarget,
    stabilizer: DistributedStabilizer,
    objective: Arc<dyn Objective>,
    state: OptimizerState,
    iterations_in_state: u32,
    scores: VecDeque<f64>,
    score_window: usize,
    pending_failure: bool,
    best: SystemMatrix,
    best_fitness: f64,
    best_penalty: BalancePenalty,
    best_state: OptimizerState,
    state_tx: watch::Sender<OptimizerState>,
}

impl fmt::Debug for AdaptiveOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveOptimizer")
            .field("state", &self.state)
            .field("iterations_in_state", &self.iterations_in_state)
            .field("objective", &self.objective.name())
            .field("best_fitness", &self.best_fitness)
            .field("best_penalty", &self.best_penalty)
            .finish_non_exhaustive()
    }
}

impl AdaptiveOptimizer {
    /// Creates an optimizer whose first candidate is a seeded random permutation of `1..=D²`.
    pub fn new(config: Arc<StabilizerConfig>, objective: Arc<dyn Objective>) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(derive_seed(config.seed, &[SEED_INITIAL]));
        let initial = SystemMatrix::random_permutation(config.dimension, &mut rng)?;
        Self::with_initial(config, objective, initial)
    }

    /// Creates an optimizer starting from `initial`.
    ///
    /// # Arguments
    /// * `config` - Validated policy constants.
    /// * `objective` - Objective shared with every local stabilizer.
    /// * `initial` - First best-known candidate; must match `config.dimension`.
    pub fn with_initial(
        config: Arc<StabilizerConfig>,
        objective: Arc<dyn Objective>,
        initial: SystemMatrix,
    ) -> Result<Self> {
        config.validate()?;
        if initial.dimension() != config.dimension {
            return Err(LumistabError::Configuration(format!(
                "initial candidate is {0}x{0}, configured dimension is {1}",
                initial.dimension(),
                config.dimension
            )));
        }
        let target = MagicSumTarget::for_dimension(config.dimension);
        let best_penalty = penalty(&initial, target);
        let best_fitness = objective.evaluate(&initial) + best_penalty.value();
        if !initial.is_finite() || !best_fitness.is_finite() {
            return Err(LumistabError::InvalidInput("initial candidate has non-finite fitness".to_string()));
        }
        let stabilizer = DistributedStabilizer::new(&config)?;
        let (state_tx, _) = watch::channel(OptimizerState::Exploration);
        let score_window = config.convergence.stability_window.max(config.transition.variance_window) + 1;
        Ok(Self {
            config,
            target,
            stabilizer,
            objective,
            state: OptimizerState::Exploration,
            iterations_in_state: 0,
            scores: VecDeque::with_capacity(score_window),
            score_window,
            pending_failure: false,
            best: initial,
            best_fitness,
            best_penalty,
            best_state: OptimizerState::Exploration,
            state_tx,
        })
    }

    /// The active state.
    pub fn state(&self) -> OptimizerState {
        self.state
    }

    /// Receiver that observes every committed state.
    pub fn subscribe(&self) -> watch::Receiver<OptimizerState> {
        self.state_tx.subscribe()
    }

    /// Best-known candidate.
    pub fn best(&self) -> &SystemMatrix {
        &self.best
    }

    /// Fitness of the best-known candidate.
    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    /// Balance penalty of the best-known candidate.
    pub fn best_penalty(&self) -> BalancePenalty {
        self.best_penalty
    }

    /// Cycles spent in the active state.
    pub fn iterations_in_state(&self) -> u32 {
        self.iterations_in_state
    }

    /// Recent scores, oldest first.
    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.scores.iter().copied()
    }

    /// The static partition topology in use.
    pub fn stabilizer(&self) -> &DistributedStabilizer {
        &self.stabilizer
    }

    fn enter(&mut self, next: OptimizerState, cycle: u64) {
        if next != self.state {
            info!(cycle, from = %self.state, to = %next, "optimizer transition");
            self.state = next;
            self.iterations_in_state = 0;
            self.state_tx.send_replace(next);
        }
    }

    fn fitness(&self, candidate: &SystemMatrix) -> f64 {
        fitness_of(self.objective.as_ref(), self.target, candidate)
    }

    /// Runs one optimization cycle.
    ///
    /// Records `score`, applies the transition function (an `alert` forces
    /// Recalibration), generates a candidate for the resulting state, stabilizes it
    /// and commits it when strictly fitter than the best-known candidate.
    ///
    /// On a stabilization failure the candidate is discarded, the best-known
    /// candidate is untouched and the optimizer enters Recalibration.
    pub async fn step(
        &mut self,
        cycle: u64,
        score: SymmetryScore,
        alert: Option<&Alert>,
        cancel: &CancellationToken,
    ) -> Result<OptimizationResult> {
        if self.scores.len() >= self.score_window {
            self.scores.pop_front();
        }
        self.scores.push_back(score.value());

        let scores = self.scores.make_contiguous().to_vec();
        let ctx = TransitionContext {
            scores: &scores,
            iterations_in_state: self.iterations_in_state,
            alert: alert.is_some(),
            partition_failure: self.pending_failure,
        };
        let next = transition(self.state, &ctx, &self.config);
        self.pending_failure = false;
        self.enter(next, cycle);
        self.iterations_in_state = self.iterations_in_state.saturating_add(1);

        let active = self.state;
        let candidate = self.generate(active, cycle).await?;

        let stabilized = match self
            .stabilizer
            .stabilize(&candidate, Arc::clone(&self.objective), cycle, cancel)
            .await
        {
            Ok(stabilized) => stabilized,
            Err(error) => return Err(self.fail(cycle, error)),
        };

        let fitness = self.fitness(&stabilized);
        if !fitness.is_finite() {
            let error = LumistabError::PartitionFailure {
                partition: None,
                reason: "stabilized candidate has non-finite fitness".to_string(),
            };
            return Err(self.fail(cycle, error));
        }

        let improved = fitness.total_cmp(&self.best_fitness).is_lt();
        if improved {
            self.best_penalty = penalty(&stabilized, self.target);
            self.best = stabilized;
            self.best_fitness = fitness;
            self.best_state = active;
            counter!("optimizer_improvements").increment(1);
        }
        gauge!("optimizer_best_fitness").set(self.best_fitness);
        debug!(
            cycle,
            state = %active,
            score = score.value(),
            fitness,
            best_fitness = self.best_fitness,
            penalty = self.best_penalty.value(),
            improved,
            "optimizer cycle committed"
        );

        Ok(OptimizationResult {
            cycle,
            matrix: self.best.clone(),
            score,
            penalty: self.best_penalty,
            state: self.best_state,
            active_state: active,
            fitness: self.best_fitness,
            improved,
            fingerprint: self.best.fingerprint(),
            timestamp: Utc::now(),
        })
    }

    fn fail(&mut self, cycle: u64, error: LumistabError) -> LumistabError {
        warn!(cycle, state = %self.state, error = %error, "stabilization failed, best candidate retained");
        counter!("optimizer_stabilization_failures").increment(1);
        self.pending_failure = true;
        self.enter(OptimizerState::Recalibration, cycle);
        error
    }

    /// State-specific candidate derived from the best-known candidate.
    async fn generate(&self, state: OptimizerState, cycle: u64) -> Result<SystemMatrix> {
        match state {
            OptimizerState::Exploration => self.explore(cycle).await,
            OptimizerState::Exploitation => self.exploit(),
            OptimizerState::Convergence => Ok(self.best.clone()),
            OptimizerState::Recalibration => self.recalibrate(cycle),
        }
    }

    /// Samples the population on the blocking pool so the rayon fan-out never
    /// occupies a runtime worker.
    async fn explore(&self, cycle: u64) -> Result<SystemMatrix> {
        let population = Population {
            best: self.best.clone(),
            objective: Arc::clone(&self.objective),
            target: self.target,
            params: self.config.exploration,
            seed: self.config.seed,
            cycle,
        };
        tokio::task::spawn_blocking(move || population.fittest())
            .await
            .map_err(|e| LumistabError::InvalidInput(format!("exploration task did not complete: {e}")))?
    }

    fn exploit(&self) -> Result<SystemMatrix> {
        let d = self.best.dimension() as f64;
        let scale = self.config.exploitation.learning_rate / (2.0 * d);
        let gradient = penalty_gradient(&self.best, self.target);
        SystemMatrix::new(&self.best.view() - &(gradient * scale))
    }

    fn recalibrate(&self, cycle: u64) -> Result<SystemMatrix> {
        let mut rng = StdRng::seed_from_u64(derive_seed(self.config.seed, &[cycle, SEED_RECALIBRATION]));
        let fresh = SystemMatrix::random_permutation(self.best.dimension(), &mut rng)?;
        self.best.blend(&fresh, self.config.recalibration.memory_weight)
    }
}

fn fitness_of(objective: &dyn Objective, target: MagicSumTarget, candidate: &SystemMatrix) -> f64 {
    let value = objective.evaluate(candidate) + penalty(candidate, target).value();
    if value.is_finite() { value } else { f64::INFINITY }
}

/// One Exploration draw: perturbations of `best`, one seeded RNG per member.
struct Population {
    best: SystemMatrix,
    objective: Arc<dyn Objective>,
    target: MagicSumTarget,
    params: ExplorationParams,
    seed: u64,
    cycle: u64,
}

impl Population {
    fn fittest(self) -> Result<SystemMatrix> {
        let d = self.best.dimension();
        let rate = self.params.exploration_rate;
        let width = rate * self.target.value() / d as f64;
        let noise = Normal::new(0.0, width).map_err(|e| LumistabError::InvalidInput(e.to_string()))?;
        let best = &self.best;
        let objective = self.objective.as_ref();

        let fittest = (0..self.params.population)
            .into_par_iter()
            .map(|member| {
                let mut rng =
                    StdRng::seed_from_u64(derive_seed(self.seed, &[self.cycle, SEED_EXPLORATION, member as u64]));
                let mut candidate = best.clone();
                for r in 0..d {
                    for c in 0..d {
                        if rng.random_bool(rate) {
                            candidate[(r, c)] += noise.sample(&mut rng);
                        }
                    }
                }
                (fitness_of(objective, self.target, &candidate), member, candidate)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        match fittest {
            Some((fitness, member, candidate)) => {
                debug!(cycle = self.cycle, member, fitness, "exploration population sampled");
                Ok(candidate)
            }
            None => Ok(self.best),
        }
    }
}
