//! CLI command definitions

use crate::core::{ConfigError, DeploymentStrategy, RunConfiguration, TestMode};
use clap::{ArgAction, Args};
use std::path::PathBuf;

/// Options describing one run, given as flags or as a YAML file
#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    /// Read the run configuration from a YAML file instead of flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Build Kubernetes and bring up a cluster
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub bringup_cluster: bool,

    /// Tear down the cluster after the e2e test
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub teardown_cluster: bool,

    /// Tear down the driver after the e2e test
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub teardown_driver: bool,

    /// Build the driver from source
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub do_driver_build: bool,

    /// Zone the cluster is created or found in
    #[arg(long = "gce-zone")]
    pub zone: Option<String>,

    /// Version of Kubernetes to download and use for the cluster
    #[arg(long)]
    pub kube_version: Option<String>,

    /// Version of Kubernetes to download and use for tests
    #[arg(long)]
    pub test_version: Option<String>,

    /// Feature gates to set on a new Kubernetes cluster
    #[arg(long)]
    pub kube_feature_gates: Option<String>,

    /// Local kubernetes/kubernetes directory to run e2e tests from
    #[arg(long)]
    pub local_k8s_dir: Option<PathBuf>,

    /// Deploy on gce or gke
    #[arg(long, value_enum)]
    pub deployment_strategy: Option<DeploymentStrategy>,

    /// Version of Kubernetes master and node for gke
    #[arg(long)]
    pub gke_cluster_version: Option<String>,

    /// Storage class file for the test, relative to test/k8s-integration/config
    #[arg(long = "storageclass-file")]
    pub storage_class_file: Option<String>,

    /// Run the in-tree migration suite instead of the storage suite
    #[arg(long)]
    pub migration_test: bool,

    /// Image to stage the driver to
    #[arg(long)]
    pub staging_image: Option<String>,

    /// Service account key file for the driver
    #[arg(long)]
    pub service_account_file: Option<PathBuf>,

    /// Kustomize overlay to deploy the driver with
    #[arg(long)]
    pub deploy_overlay_name: Option<String>,

    /// Test focus for Kubernetes e2e
    #[arg(long)]
    pub test_focus: Option<String>,

    /// Driver source directory (defaults to the driver under $GOPATH)
    #[arg(long)]
    pub pkg_dir: Option<PathBuf>,
}

impl ConfigArgs {
    /// Build and validate the run configuration
    pub fn resolve(&self) -> Result<RunConfiguration, ConfigError> {
        let config = match &self.config {
            Some(path) => RunConfiguration::from_file(path)?,
            None => self.to_configuration()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn to_configuration(&self) -> Result<RunConfiguration, ConfigError> {
        let test_mode = match (self.migration_test, &self.storage_class_file) {
            (true, Some(_)) => {
                return Err(ConfigError::Conflict(
                    "storage-class-file and migration-test cannot both be set",
                ))
            }
            (true, None) => TestMode::Migration,
            (false, Some(file)) => TestMode::Direct {
                storage_class_file: file.clone(),
            },
            (false, None) => {
                return Err(ConfigError::Conflict(
                    "One of storageclass-file and migration-test must be set",
                ))
            }
        };

        let pkg_dir = self
            .pkg_dir
            .clone()
            .or_else(RunConfiguration::default_pkg_dir)
            .ok_or(ConfigError::NoPackageDir)?;

        Ok(RunConfiguration {
            bringup_cluster: self.bringup_cluster,
            teardown_cluster: self.teardown_cluster,
            teardown_driver: self.teardown_driver,
            do_driver_build: self.do_driver_build,
            zone: self.zone.clone().unwrap_or_default(),
            kube_version: self.kube_version.clone(),
            test_version: self.test_version.clone(),
            kube_feature_gates: self.kube_feature_gates.clone(),
            local_k8s_dir: self.local_k8s_dir.clone(),
            deployment_strategy: self.deployment_strategy,
            gke_cluster_version: self.gke_cluster_version.clone(),
            staging_image: self.staging_image.clone(),
            service_account_file: self.service_account_file.clone().unwrap_or_default(),
            deploy_overlay_name: self.deploy_overlay_name.clone().unwrap_or_default(),
            test_focus: self.test_focus.clone().unwrap_or_default(),
            test_mode,
            pkg_dir,
        })
    }
}

/// Provision, test and tear down
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Timeout for each external command, in seconds
    #[arg(long, default_value_t = 10800)]
    pub command_timeout_secs: u64,

    /// Directory the e2e suite writes reports to (defaults to $ARTIFACTS)
    #[arg(long)]
    pub artifacts_dir: Option<PathBuf>,
}

/// Validate a run configuration without running anything
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output the resolved configuration in JSON format
    #[arg(long)]
    pub json: bool,
}
