/* src/distributed.rs */
//! # Distributed Stabilizer
//!
//! Fans one candidate out to a fixed pool of [`LocalStabilizer`]s, waits on a barrier
//! for every partition and reassembles the blocks positionally.
//!
//! - The topology is built once at construction and never re-derived per call.
//! - Each partition runs on the blocking pool against a shared read-only copy of
//!   the candidate. At most `max_blocking_threads` partitions run at once.
//! - The barrier is bounded by a timeout and races the cycle's cancellation token.
//!   An abandoned pass aborts its partition tasks and signals their local searches
//!   to stop, so worker permits are free again before the next cycle starts.
//! - Aggregation starts from a copy of the input, so cells outside every partition
//!   are carried over. Blocks are written in partition-index order, so with
//!   overlapping partitions the highest index wins.
//! - Any failure fails the whole call. A partially aggregated matrix is never
//!   returned.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use ndarray::Array2;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::balance::MagicSumTarget;
use crate::config::StabilizerConfig;
use crate::error::{LumistabError, Result};
use crate::local::LocalStabilizer;
use crate::matrix::SystemMatrix;
use crate::objective::Objective;
use crate::topology::{Region, Topology};

/// Coordinator over the static partition topology.
#[derive(Debug, Clone)]
pub struct DistributedStabilizer {
    topology: Topology,
    locals: Vec<LocalStabilizer>,
    barrier_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl DistributedStabilizer {
    /// Builds the topology and one local stabilizer per partition.
    pub fn new(config: &StabilizerConfig) -> Result<Self> {
        let topology = config.build_topology()?;
        if topology.overlaps() {
            warn!(partitions = topology.len(), "overlapping partitions: last writer by partition index wins");
        }
        let target = MagicSumTarget::for_dimension(config.dimension);
        let locals = topology
            .regions()
            .iter()
            .enumerate()
            .map(|(index, region)| LocalStabilizer::new(index, *region, config.local, target, config.seed))
            .collect();
        Ok(Self {
            topology,
            locals,
            barrier_timeout: Duration::from_millis(config.barrier_timeout_ms),
            permits: Arc::new(Semaphore::new(config.max_blocking_threads.max(1))),
        })
    }

    /// The static topology in use.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Runs every local stabilizer concurrently and aggregates their blocks.
    #[instrument(level = "debug", skip_all, fields(cycle = cycle, partitions = self.locals.len()))]
    pub async fn stabilize(
        &self,
        matrix: &SystemMatrix,
        objective: Arc<dyn Objective>,
        cycle: u64,
        cancel: &CancellationToken,
    ) -> Result<SystemMatrix> {
        if matrix.dimension() != self.topology.dimension() {
            return Err(LumistabError::PartitionFailure {
                partition: None,
                reason: format!(
                    "candidate dimension {} does not match topology dimension {}",
                    matrix.dimension(),
                    self.topology.dimension()
                ),
            });
        }
        if cancel.is_cancelled() {
            return Err(LumistabError::Cancelled);
        }

        let started = Instant::now();
        let shared = Arc::new(matrix.clone());
        let abandon = cancel.child_token();
        let guard = abandon.clone().drop_guard();
        let handles: Vec<JoinHandle<Result<Array2<f64>>>> = self
            .locals
            .iter()
            .cloned()
            .map(|local| {
                let matrix = Arc::clone(&shared);
                let objective = Arc::clone(&objective);
                let permits = Arc::clone(&self.permits);
                tokio::spawn(run_partition(local, matrix, objective, permits, cycle, abandon.clone()))
            })
            .collect();
        let aborts: Vec<AbortHandle> = handles.iter().map(JoinHandle::abort_handle).collect();
        let release = || {
            abandon.cancel();
            aborts.iter().for_each(AbortHandle::abort);
        };

        let barrier = tokio::time::timeout(self.barrier_timeout, join_all(handles));
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                release();
                counter!("stabilizer_cancelled").increment(1);
                return Err(LumistabError::Cancelled);
            }
            outcome = barrier => match outcome {
                Ok(joined) => joined,
                Err(_) => {
                    release();
                    counter!("stabilizer_barrier_timeouts").increment(1);
                    return Err(LumistabError::BarrierTimeout {
                        timeout_ms: self.barrier_timeout.as_millis() as u64,
                    });
                }
            },
        };
        guard.disarm();

        let mut blocks = Vec::with_capacity(joined.len());
        for (index, outcome) in joined.into_iter().enumerate() {
            let block = outcome.map_err(|e| LumistabError::partition(index, format!("task did not complete: {e}")))??;
            blocks.push((*self.locals[index].region(), block));
        }
        let aggregate = aggregate(matrix, &blocks)?;

        debug!(
            cycle,
            partitions = blocks.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "stabilization barrier passed"
        );
        histogram!("stabilizer_barrier_us").record(started.elapsed().as_micros() as f64);
        Ok(aggregate)
    }
}

/// Runs one local stabilizer on the blocking pool once a worker permit is free.
async fn run_partition(
    local: LocalStabilizer,
    matrix: Arc<SystemMatrix>,
    objective: Arc<dyn Objective>,
    permits: Arc<Semaphore>,
    cycle: u64,
    cancel: CancellationToken,
) -> Result<Array2<f64>> {
    let index = local.index();
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|_| LumistabError::partition(index, "worker pool closed"))?;
    tokio::task::spawn_blocking(move || local.local_optimize(&matrix, objective.as_ref(), cycle, &cancel))
        .await
        .map_err(|e| LumistabError::partition(index, format!("task did not complete: {e}")))?
}

/// Writes `blocks` over a copy of `base` in order; later blocks overwrite earlier ones.
fn aggregate(base: &SystemMatrix, blocks: &[(Region, Array2<f64>)]) -> Result<SystemMatrix> {
    let mut result = base.clone();
    for (index, (region, block)) in blocks.iter().enumerate() {
        result
            .write_region(region, block)
            .map_err(|e| LumistabError::partition(index, e.to_string()))?;
    }
    if !result.is_finite() {
        return Err(LumistabError::PartitionFailure {
            partition: None,
            reason: "aggregate contains non-finite cells".to_string(),
        });
    }
    Ok(result)
}
