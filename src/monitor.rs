/* src/monitor.rs */
//! # Real-Time Monitor
//!
//! Keeps a bounded FIFO of per-cycle metrics records and flags anomalies. An alert
//! is the only external override of the optimizer's own transition logic.
//!
//! Two detectors run on every observation:
//!
//! - **Deviation**: for each monitored channel, the new value is compared against
//!   the mean and standard deviation of the preceding `statistics_window` records.
//!   Checks start once `min_samples` records exist. The deviation is floored at
//!   `relative_sigma_floor · max(|mean|, 1)`, so a perfectly flat history does not
//!   turn floating-point noise into an alert.
//! - **Degradation run**: consecutive increases of the symmetry score. A run longer
//!   than `max_degradation_run` raises an alert and restarts the count.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::MonitorParams;
use crate::error::LumistabError;
use crate::snapshot::PerformanceSnapshot;
use crate::symmetry::SymmetryBreakdown;

// =====================================================================================
// METRICS RECORDS
// =====================================================================================

/// A monitored scalar of a [`MetricsRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricChannel {
    /// Weighted symmetry score.
    SymmetryScore,
    /// Temporal sub-score.
    Temporal,
    /// Spatial sub-score.
    Spatial,
    /// Energy imbalance sub-score.
    EnergyImbalance,
    /// Sum of the snapshot energies.
    EnergyTotal,
    /// Largest absolute snapshot energy.
    EnergyPeak,
}

impl fmt::Display for MetricChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricChannel::SymmetryScore => "symmetry_score",
            MetricChannel::Temporal => "temporal",
            MetricChannel::Spatial => "spatial",
            MetricChannel::EnergyImbalance => "energy_imbalance",
            MetricChannel::EnergyTotal => "energy_total",
            MetricChannel::EnergyPeak => "energy_peak",
        };
        f.write_str(name)
    }
}

/// Metrics computed for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Engine cycle index.
    pub cycle: u64,
    /// Snapshot timestamp.
    pub timestamp: f64,
    /// Weighted symmetry score.
    pub score: f64,
    /// Temporal sub-score.
    pub temporal: f64,
    /// Spatial sub-score.
    pub spatial: f64,
    /// Energy imbalance sub-score.
    pub energy_imbalance: f64,
    /// Sum of energies.
    pub energy_total: f64,
    /// Peak absolute energy.
    pub energy_peak: f64,
}

impl MetricsRecord {
    /// Derives the record from a snapshot and its evaluation.
    pub fn from_snapshot(cycle: u64, snapshot: &PerformanceSnapshot, breakdown: &SymmetryBreakdown) -> Self {
        Self {
            cycle,
            timestamp: snapshot.timestamp(),
            score: breakdown.score.value(),
            temporal: breakdown.temporal,
            spatial: breakdown.spatial,
            energy_imbalance: breakdown.energy,
            energy_total: snapshot.energy_total(),
            energy_peak: snapshot.energy_peak(),
        }
    }

    /// Value of one channel.
    pub fn value(&self, channel: MetricChannel) -> f64 {
        match channel {
            MetricChannel::SymmetryScore => self.score,
            MetricChannel::Temporal => self.temporal,
            MetricChannel::Spatial => self.spatial,
            MetricChannel::EnergyImbalance => self.energy_imbalance,
            MetricChannel::EnergyTotal => self.energy_total,
            MetricChannel::EnergyPeak => self.energy_peak,
        }
    }
}

/// Bounded FIFO of the most recent records; the oldest is evicted when full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsHistory {
    capacity: usize,
    records: VecDeque<MetricsRecord>,
}

impl MetricsHistory {
    /// Empty history holding at most `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity, records: VecDeque::with_capacity(capacity) }
    }

    /// Appends a record, evicting the oldest when at capacity.
    pub fn push(&mut self, record: MetricsRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no record is held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<&MetricsRecord> {
        self.records.back()
    }

    /// Records oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MetricsRecord> {
        self.records.iter()
    }

    /// The last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &MetricsRecord> {
        self.records.iter().skip(self.records.len().saturating_sub(n))
    }
}

// =====================================================================================
// ALERTS
// =====================================================================================

/// What triggered an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    /// A channel strayed from its rolling mean.
    Deviation {
        /// Offending channel.
        channel: MetricChannel,
        /// Observed deviation in standard deviations.
        z_score: f64,
        /// Configured limit.
        sigma_limit: f64,
    },
    /// The symmetry score increased for too many consecutive cycles.
    DegradationRun {
        /// Length of the run.
        length: usize,
    },
}

/// An anomaly the optimizer must answer with recalibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Cycle of the offending record.
    pub cycle: u64,
    /// Trigger.
    pub kind: AlertKind,
    /// Human-readable description.
    pub message: String,
}

#[derive(Debug)]
struct MonitorState {
    history: MetricsHistory,
    degradation_run: usize,
}

// =====================================================================================
// MONITOR
// =====================================================================================

/// Bounded anomaly monitor shared behind an async read/write lock.
#[derive(Debug)]
pub struct RealTimeMonitor {
    params: MonitorParams,
    state: Arc<RwLock<MonitorState>>,
    alerts_raised: AtomicU64,
    failures_noted: AtomicU64,
}

impl RealTimeMonitor {
    /// Creates an empty monitor.
    pub fn new(params: MonitorParams) -> Self {
        let history = MetricsHistory::with_capacity(params.capacity);
        Self {
            params,
            state: Arc::new(RwLock::new(MonitorState { history, degradation_run: 0 })),
            alerts_raised: AtomicU64::new(0),
            failures_noted: AtomicU64::new(0),
        }
    }

    /// Records `record` and reports an anomaly if one is detected.
    ///
    /// The check and the append happen under one write lock, so concurrent readers
    /// see the history either entirely before or entirely after this record.
    pub async fn observe(&self, record: MetricsRecord) -> Option<Alert> {
        let mut state = self.state.write().await;

        let mut alert = self.deviation_alert(&state.history, &record);

        let increased = state.history.latest().is_some_and(|prev| record.score > prev.score);
        state.degradation_run = if increased { state.degradation_run + 1 } else { 0 };
        if state.degradation_run > self.params.max_degradation_run {
            let length = state.degradation_run;
            state.degradation_run = 0;
            if alert.is_none() {
                alert = Some(Alert {
                    cycle: record.cycle,
                    kind: AlertKind::DegradationRun { length },
                    message: format!("symmetry score increased for {length} consecutive cycles"),
                });
            }
        }

        state.history.push(record);
        drop(state);

        if let Some(alert) = &alert {
            self.alerts_raised.fetch_add(1, Ordering::Relaxed);
            counter!("monitor_alerts").increment(1);
            warn!(cycle = alert.cycle, kind = ?alert.kind, "{}", alert.message);
        }
        alert
    }

    fn deviation_alert(&self, history: &MetricsHistory, record: &MetricsRecord) -> Option<Alert> {
        if history.len() < self.params.min_samples {
            return None;
        }
        let mut worst: Option<(MetricChannel, f64)> = None;
        for &channel in &self.params.channels {
            let window: Vec<f64> = history.recent(self.params.statistics_window).map(|r| r.value(channel)).collect();
            let n = window.len() as f64;
            let mean = window.iter().sum::<f64>() / n;
            let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let sigma = variance.sqrt().max(self.params.relative_sigma_floor * mean.abs().max(1.0));
            let z = (record.value(channel) - mean).abs() / sigma;
            if z > self.params.sigma_limit && worst.map_or(true, |(_, w)| z > w) {
                worst = Some((channel, z));
            }
        }
        worst.map(|(channel, z_score)| Alert {
            cycle: record.cycle,
            kind: AlertKind::Deviation { channel, z_score, sigma_limit: self.params.sigma_limit },
            message: format!(
                "{channel} deviated {z_score:.2} sigma from its rolling mean (limit {})",
                self.params.sigma_limit
            ),
        })
    }

    /// Records a per-cycle failure reported by the engine.
    pub async fn note_failure(&self, cycle: u64, error: &LumistabError) {
        let failures = self.failures_noted.fetch_add(1, Ordering::Relaxed) + 1;
        let history_len = self.state.read().await.history.len();
        debug!(cycle, failures, history_len, error = %error, "cycle failure noted");
    }

    /// A consistent copy of the history at call time.
    pub async fn snapshot(&self) -> MetricsHistory {
        self.state.read().await.history.clone()
    }

    /// Current length of the consecutive score-increase run.
    pub async fn degradation_run(&self) -> usize {
        self.state.read().await.degradation_run
    }

    /// Total alerts raised.
    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised.load(Ordering::Relaxed)
    }

    /// Total failures noted.
    pub fn failures_noted(&self) -> u64 {
        self.failures_noted.load(Ordering::Relaxed)
    }

    /// Parameters in effect.
    pub fn params(&self) -> &MonitorParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cycle: u64, score: f64, energy_total: f64) -> MetricsRecord {
        MetricsRecord {
            cycle,
            timestamp: cycle as f64,
            score,
            temporal: 0.0,
            spatial: 0.0,
            energy_imbalance: 0.0,
            energy_total,
            energy_peak: energy_total / 4.0,
        }
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = MetricsHistory::with_capacity(3);
        for cycle in 1..=5 {
            history.push(record(cycle, 0.1, 40.0));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().next().map(|r| r.cycle), Some(3));
        assert_eq!(history.latest().map(|r| r.cycle), Some(5));
        assert_eq!(history.recent(2).map(|r| r.cycle).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_outlier_raises_deviation_alert() {
        let monitor = RealTimeMonitor::new(MonitorParams::default());
        for cycle in 1..=8 {
            assert!(monitor.observe(record(cycle, 0.2, 40.0)).await.is_none());
        }
        let alert = monitor.observe(record(9, 0.2, 1.0e6)).await.unwrap();
        assert_eq!(alert.cycle, 9);
        assert!(matches!(
            alert.kind,
            AlertKind::Deviation { channel: MetricChannel::EnergyTotal | MetricChannel::EnergyPeak, .. }
        ));
        assert_eq!(monitor.alerts_raised(), 1);
        assert_eq!(monitor.snapshot().await.len(), 9);
    }

    #[tokio::test]
    async fn test_no_checks_before_min_samples() {
        let monitor = RealTimeMonitor::new(MonitorParams::default());
        for cycle in 1..=4 {
            monitor.observe(record(cycle, 0.2, 40.0)).await;
        }
        // only four prior records
        assert!(monitor.observe(record(5, 0.2, 1.0e6)).await.is_none());
    }

    #[tokio::test]
    async fn test_degradation_run_alerts_and_resets() {
        let monitor = RealTimeMonitor::new(MonitorParams::default());
        for cycle in 1..=6 {
            assert!(monitor.observe(record(cycle, cycle as f64, 40.0)).await.is_none(), "cycle {cycle}");
        }
        let alert = monitor.observe(record(7, 7.0, 40.0)).await.unwrap();
        assert_eq!(alert.kind, AlertKind::DegradationRun { length: 6 });
        assert_eq!(monitor.degradation_run().await, 0);
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let monitor = RealTimeMonitor::new(MonitorParams::default());
        monitor.note_failure(3, &LumistabError::Cancelled).await;
        assert_eq!(monitor.failures_noted(), 1);
    }
}
