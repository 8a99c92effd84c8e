//! k8s-integration - provisions a test cluster, installs the PD CSI driver and runs e2e tests

pub mod cli;
pub mod core;
pub mod execution;
pub mod external;

// Re-export commonly used types
pub use core::{Outcome, PipelineError, RunConfiguration, RunContext, TaskSlot, Workspace};
pub use execution::{PipelineDriver, PipelineEvent, RunReport, TeardownStack};
pub use external::{ExternalOperations, OperationError, ShellOperations, ToolConfig};
