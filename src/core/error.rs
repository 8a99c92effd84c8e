//! Error types for configuration and pipeline runs

use crate::core::outcome::TaskFailure;
use crate::external::OperationError;
use thiserror::Error;

/// An invalid or contradictory run configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is a required flag")]
    Missing(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("could not determine the driver source directory: set --pkg-dir or GOPATH")]
    NoPackageDir,

    #[error("failed to read config file {path}: {reason}")]
    Load { path: String, reason: String },
}

/// The single terminal error of a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Acquisition(#[from] TaskFailure),

    #[error("failed to install CSI driver: {0}")]
    DriverInstall(#[source] OperationError),

    #[error("failed to run tests: {0}")]
    TestRun(#[source] OperationError),
}
