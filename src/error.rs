/* src/error.rs */
//! Unified error taxonomy for the stabilization control loop.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =====================================================================================
// ERROR HANDLING
// =====================================================================================

/// The component that raised a per-cycle failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    /// Snapshot scoring.
    SymmetryEvaluator,
    /// A single partition solver.
    LocalStabilizer,
    /// Fan-out / fan-in coordinator.
    DistributedStabilizer,
    /// The state machine driving candidate selection.
    AdaptiveOptimizer,
    /// The apparatus-control boundary.
    Apparatus,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::SymmetryEvaluator => "symmetry-evaluator",
            Component::LocalStabilizer => "local-stabilizer",
            Component::DistributedStabilizer => "distributed-stabilizer",
            Component::AdaptiveOptimizer => "adaptive-optimizer",
            Component::Apparatus => "apparatus",
        };
        f.write_str(name)
    }
}

/// Unified error type for the stabilization loop.
///
/// Per-cycle failures (`InvalidSnapshot`, `PartitionFailure`, `BarrierTimeout`,
/// `Cancelled`) are contained by the engine and never abort a run.
/// `Configuration` is fatal and only raised before the first cycle.
#[derive(Error, Debug)]
pub enum LumistabError {
    /// Malformed or empty metrics input.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// One or more local stabilizers failed; no partial aggregate is produced.
    #[error("Partition failure{}: {reason}", .partition.map(|p| format!(" (partition {p})")).unwrap_or_default())]
    PartitionFailure {
        /// Index of the failing partition, when a single partition is at fault.
        partition: Option<usize>,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The fan-in barrier did not complete in time.
    #[error("Stabilization barrier timed out after {timeout_ms} ms")]
    BarrierTimeout {
        /// The configured barrier timeout.
        timeout_ms: u64,
    },

    /// The enclosing cycle was cancelled while partitions were in flight.
    #[error("Cycle cancelled")]
    Cancelled,

    /// Invalid dimension, topology or policy constants.
    #[error("Configuration Error: {0}")]
    Configuration(String),

    /// Invalid arguments to a library call.
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// The apparatus rejected an operation in its current state.
    #[error("Apparatus Error: {0}")]
    Apparatus(String),

    /// System I/O failure.
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// A per-cycle failure wrapped with the context needed to reproduce it offline.
    #[error("cycle {cycle} failed in {component} [{policy}]: {source}")]
    Cycle {
        /// Engine cycle index.
        cycle: u64,
        /// Component that raised the failure.
        component: Component,
        /// Policy summary of the configuration in effect.
        policy: String,
        /// The underlying failure.
        #[source]
        source: Box<LumistabError>,
    },
}

impl LumistabError {
    /// Whether the failure is contained within a single cycle.
    pub fn is_recoverable(&self) -> bool {
        match self {
            LumistabError::InvalidSnapshot(_)
            | LumistabError::PartitionFailure { .. }
            | LumistabError::BarrierTimeout { .. }
            | LumistabError::Cancelled => true,
            LumistabError::Cycle { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Whether the failure came from the stabilization barrier (partition, timeout or cancel).
    pub fn is_partition_failure(&self) -> bool {
        match self {
            LumistabError::PartitionFailure { .. }
            | LumistabError::BarrierTimeout { .. }
            | LumistabError::Cancelled => true,
            LumistabError::Cycle { source, .. } => source.is_partition_failure(),
            _ => false,
        }
    }

    /// Whether the failure is an invalid snapshot, directly or wrapped.
    pub fn is_invalid_snapshot(&self) -> bool {
        match self {
            LumistabError::InvalidSnapshot(_) => true,
            LumistabError::Cycle { source, .. } => source.is_invalid_snapshot(),
            _ => false,
        }
    }

    /// Index of the single partition at fault, directly or wrapped.
    pub fn failing_partition(&self) -> Option<usize> {
        match self {
            LumistabError::PartitionFailure { partition, .. } => *partition,
            LumistabError::Cycle { source, .. } => source.failing_partition(),
            _ => None,
        }
    }

    /// The component a stabilization failure is attributed to.
    pub fn stabilization_component(&self) -> Component {
        if self.failing_partition().is_some() {
            Component::LocalStabilizer
        } else if self.is_partition_failure() {
            Component::DistributedStabilizer
        } else {
            Component::AdaptiveOptimizer
        }
    }

    pub(crate) fn partition(partition: usize, reason: impl Into<String>) -> Self {
        LumistabError::PartitionFailure { partition: Some(partition), reason: reason.into() }
    }
}

impl From<serde_json::Error> for LumistabError {
    fn from(error: serde_json::Error) -> Self {
        LumistabError::Serialization(error.to_string())
    }
}

impl From<serde_yaml::Error> for LumistabError {
    fn from(error: serde_yaml::Error) -> Self {
        LumistabError::Serialization(error.to_string())
    }
}

/// A specialized `Result` type for stabilization operations.
pub type Result<T> = std::result::Result<T, LumistabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability_classification() {
        assert!(LumistabError::InvalidSnapshot("empty".into()).is_recoverable());
        assert!(LumistabError::partition(2, "nan").is_recoverable());
        assert!(LumistabError::BarrierTimeout { timeout_ms: 10 }.is_recoverable());
        assert!(!LumistabError::Configuration("D=2".into()).is_recoverable());

        let wrapped = LumistabError::Cycle {
            cycle: 7,
            component: Component::DistributedStabilizer,
            policy: "D=3".into(),
            source: Box::new(LumistabError::partition(1, "nan")),
        };
        assert!(wrapped.is_recoverable());
        assert!(wrapped.is_partition_failure());
        assert!(!wrapped.is_invalid_snapshot());
    }

    #[test]
    fn test_cycle_context_is_rendered() {
        let wrapped = LumistabError::Cycle {
            cycle: 42,
            component: Component::SymmetryEvaluator,
            policy: "D=3 weights=0.4/0.3/0.3".into(),
            source: Box::new(LumistabError::InvalidSnapshot("no energy samples".into())),
        };
        let message = wrapped.to_string();
        assert!(message.contains("cycle 42"));
        assert!(message.contains("symmetry-evaluator"));
        assert!(message.contains("D=3"));
        assert!(message.contains("no energy samples"));
    }

    #[test]
    fn test_partition_failure_message() {
        let err = LumistabError::partition(3, "non-finite cell");
        assert_eq!(err.to_string(), "Partition failure (partition 3): non-finite cell");
        let err = LumistabError::PartitionFailure { partition: None, reason: "dimension mismatch".into() };
        assert_eq!(err.to_string(), "Partition failure: dimension mismatch");
    }

    #[test]
    fn test_stabilization_failures_are_attributed() {
        assert_eq!(LumistabError::partition(2, "nan").failing_partition(), Some(2));
        assert_eq!(LumistabError::partition(2, "nan").stabilization_component(), Component::LocalStabilizer);
        assert_eq!(
            LumistabError::BarrierTimeout { timeout_ms: 5 }.stabilization_component(),
            Component::DistributedStabilizer
        );
        assert_eq!(LumistabError::Cancelled.stabilization_component(), Component::DistributedStabilizer);
        assert_eq!(
            LumistabError::InvalidInput("sigma".into()).stabilization_component(),
            Component::AdaptiveOptimizer
        );
    }
}
