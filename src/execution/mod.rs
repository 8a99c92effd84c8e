//! Pipeline execution: concurrent setup, sequential install and test, teardown

pub mod aggregate;
pub mod driver;
pub mod gate;
pub mod launcher;
pub mod plan;
pub mod teardown;

pub use aggregate::{AggregateResult, OutcomeAggregator};
pub use driver::{
    cluster_exports, EventHandler, Phase, PipelineDriver, PipelineEvent, RunReport,
    FEATURE_GATES_ENV, KUBECTL_ENV,
};
pub use gate::{DependencyGate, GateReader, GateWriter};
pub use launcher::{task_group, TaskLauncher};
pub use plan::SetupPlan;
pub use teardown::{ReleaseRecord, TeardownEntry, TeardownReport, TeardownStack};
