//! Task slots and the outcome each setup task reports

use crate::core::context::Exports;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The fixed set of concurrent setup tasks, in slot order.
///
/// Slot order decides which failure is reported when several tasks fail,
/// and the order in which acquired resources are registered for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskSlot {
    /// Download and build the Kubernetes tree used to bring up the cluster
    ClusterBuild,
    /// Download and build the Kubernetes tree the e2e tests run from
    TestBuild,
    /// Build and push the driver container image
    DriverImage,
    /// Bring up the test cluster
    ClusterUp,
}

impl TaskSlot {
    pub const ALL: [TaskSlot; 4] = [
        TaskSlot::ClusterBuild,
        TaskSlot::TestBuild,
        TaskSlot::DriverImage,
        TaskSlot::ClusterUp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskSlot::ClusterBuild => "cluster-build",
            TaskSlot::TestBuild => "test-build",
            TaskSlot::DriverImage => "driver-image",
            TaskSlot::ClusterUp => "cluster-up",
        }
    }

    #[cfg(test)]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TaskSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a task did not perform its operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The run configuration does not need this step
    NotRequired,
    /// The step this task depends on failed
    UpstreamFailed(TaskSlot),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotRequired => f.write_str("not required"),
            SkipReason::UpstreamFailed(slot) => write!(f, "{} failed", slot),
        }
    }
}

/// A failed setup task and its cause
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{slot} failed: {cause}")]
pub struct TaskFailure {
    pub slot: TaskSlot,
    pub cause: String,
}

impl TaskFailure {
    pub fn new(slot: TaskSlot, cause: impl Into<String>) -> Self {
        Self {
            slot,
            cause: cause.into(),
        }
    }
}

/// Result of one setup task. Produced exactly once per slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The operation ran and succeeded; `exports` become visible to later
    /// phases once the aggregate is known
    Succeeded { exports: Exports },
    /// The operation was not run
    Skipped { reason: SkipReason },
    /// The operation ran and failed
    Failed(TaskFailure),
}

impl Outcome {
    pub fn succeeded() -> Self {
        Outcome::Succeeded {
            exports: Exports::new(),
        }
    }

    pub fn not_required() -> Self {
        Outcome::Skipped {
            reason: SkipReason::NotRequired,
        }
    }

    pub fn failed(slot: TaskSlot, cause: impl Into<String>) -> Self {
        Outcome::Failed(TaskFailure::new(slot, cause))
    }

    /// Whether this outcome stops the pipeline from proceeding
    #[cfg(test)]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            Outcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
