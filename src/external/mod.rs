//! External operations the pipeline delegates to
//!
//! Each operation is a single blocking call (download and build a source
//! tree, push an image, bring a cluster up, run a test suite) that either
//! succeeds or returns an [`OperationError`]. The pipeline only depends on
//! the [`ExternalOperations`] trait; [`ShellOperations`] is the
//! process-backed implementation.

pub mod command;
pub mod config;
pub mod error;
pub mod shell;
pub mod test_driver;

use crate::core::{DeploymentStrategy, Exports};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use command::{CommandRunner, ExternalCommand};
pub use config::ToolConfig;
pub use error::OperationError;
pub use shell::ShellOperations;

/// Parameters for bringing a cluster up or down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterParams {
    /// Kubernetes tree whose scripts manage a GCE cluster
    pub k8s_dir: Option<PathBuf>,
    pub zone: String,
    pub gke_cluster_version: Option<String>,
}

/// Parameters for installing or deleting the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverParams {
    /// Pushed image and tag, when the driver was built from source
    pub image: Option<(String, String)>,
    /// Kustomize overlay to deploy with
    pub overlay: String,
    pub service_account_file: PathBuf,
}

/// Parameters shared by both test modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestParams {
    /// Kubernetes tree holding the e2e binaries
    pub test_dir: Option<PathBuf>,
    pub focus: String,
    pub zone: String,
}

/// The external collaborators the pipeline drives
///
/// Implementations must be safe to call concurrently: the setup operations
/// run at the same time on disjoint resources.
#[async_trait]
pub trait ExternalOperations: Send + Sync {
    /// Download the Kubernetes source for `version` into `target_dir` and build it
    async fn download_and_build_source(
        &self,
        target_dir: &Path,
        version: &str,
    ) -> Result<(), OperationError>;

    /// Build the driver image and push it as `image:tag`
    async fn push_driver_image(&self, image: &str, tag: &str) -> Result<(), OperationError>;

    async fn delete_driver_image(&self, image: &str, tag: &str) -> Result<(), OperationError>;

    async fn cluster_up(
        &self,
        strategy: DeploymentStrategy,
        params: &ClusterParams,
        env: &Exports,
    ) -> Result<(), OperationError>;

    async fn cluster_down(
        &self,
        strategy: DeploymentStrategy,
        params: &ClusterParams,
        env: &Exports,
    ) -> Result<(), OperationError>;

    async fn install_driver(&self, params: &DriverParams, env: &Exports) -> Result<(), OperationError>;

    async fn delete_driver(&self, params: &DriverParams, env: &Exports) -> Result<(), OperationError>;

    /// Run the storage suite against the driver described by `storage_class_file`
    async fn run_direct_tests(
        &self,
        params: &TestParams,
        storage_class_file: &str,
        env: &Exports,
    ) -> Result<(), OperationError>;

    /// Run the in-tree plugin migration suite
    async fn run_migration_tests(&self, params: &TestParams, env: &Exports) -> Result<(), OperationError>;
}
