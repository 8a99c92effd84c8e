//! Run configuration - resolved options for one pipeline execution

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Import path of the driver repository under GOPATH
const DRIVER_IMPORT_PATH: &str = "src/sigs.k8s.io/gcp-compute-persistent-disk-csi-driver";

/// How the test cluster is brought up and down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStrategy {
    /// Self-managed cluster on Compute Engine, using the Kubernetes tree's scripts
    Gce,
    /// Managed GKE cluster
    Gke,
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStrategy::Gce => f.write_str("gce"),
            DeploymentStrategy::Gke => f.write_str("gke"),
        }
    }
}

/// Which e2e suite runs once the driver is installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum TestMode {
    /// Storage tests against the driver, described by a storage class file
    Direct { storage_class_file: String },
    /// In-tree to CSI migration tests
    Migration,
}

fn default_true() -> bool {
    true
}

/// Immutable options for one run. Built and validated before the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Build Kubernetes (if needed) and bring up a cluster
    #[serde(default = "default_true")]
    pub bringup_cluster: bool,

    /// Tear the cluster and the pushed image down afterwards
    #[serde(default = "default_true")]
    pub teardown_cluster: bool,

    /// Delete the driver from the cluster afterwards
    #[serde(default = "default_true")]
    pub teardown_driver: bool,

    /// Build and push the driver image from source
    #[serde(default = "default_true")]
    pub do_driver_build: bool,

    /// Zone the cluster is created or found in
    pub zone: String,

    /// Kubernetes version to download and build for the cluster
    #[serde(default)]
    pub kube_version: Option<String>,

    /// Kubernetes version to download and build for the tests
    #[serde(default)]
    pub test_version: Option<String>,

    /// Feature gates set on a new cluster
    #[serde(default)]
    pub kube_feature_gates: Option<String>,

    /// Prebuilt local Kubernetes tree
    #[serde(default)]
    pub local_k8s_dir: Option<PathBuf>,

    #[serde(default)]
    pub deployment_strategy: Option<DeploymentStrategy>,

    /// Master and node version for GKE clusters
    #[serde(default)]
    pub gke_cluster_version: Option<String>,

    /// Image the driver is pushed to
    #[serde(default)]
    pub staging_image: Option<String>,

    pub service_account_file: PathBuf,

    /// Kustomize overlay the driver is deployed with
    pub deploy_overlay_name: String,

    /// Ginkgo focus expression
    pub test_focus: String,

    pub test_mode: TestMode,

    /// Driver source tree
    pub pkg_dir: PathBuf,
}

impl RunConfiguration {
    /// Load a configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Load { reason, .. } => ConfigError::Load {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse a configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Driver source tree under `$GOPATH`, if GOPATH is set
    pub fn default_pkg_dir() -> Option<PathBuf> {
        std::env::var_os("GOPATH").map(|gopath| PathBuf::from(gopath).join(DRIVER_IMPORT_PATH))
    }

    /// Whether the tests need their own Kubernetes tree
    pub fn builds_separate_test_tree(&self) -> bool {
        match &self.test_version {
            Some(test_version) => self.kube_version.as_ref() != Some(test_version),
            None => false,
        }
    }

    /// Accepted option combinations that probably do not do what was meant
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.teardown_cluster && !self.bringup_cluster {
            warnings.push(
                "teardown-cluster is set but no cluster is brought up; only resources this run acquires are torn down, so an existing cluster is left running",
            );
        }
        warnings
    }

    /// Check the mutual-exclusivity and required-together rules between options
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.do_driver_build {
            require(&self.staging_image, "staging-image")?;
        }
        if self.service_account_file.as_os_str().is_empty() {
            return Err(ConfigError::Missing("service-account-file"));
        }
        require_str(&self.deploy_overlay_name, "deploy-overlay-name")?;
        require_str(&self.test_focus, "test-focus")?;
        require_str(&self.zone, "gce-zone")?;

        if let TestMode::Direct { storage_class_file } = &self.test_mode {
            require_str(storage_class_file, "storageclass-file")?;
        }

        if !self.bringup_cluster {
            forbid(
                &self.kube_feature_gates,
                "kube-feature-gates set but not bringing up new cluster",
            )?;
        }

        if self.bringup_cluster || self.teardown_cluster {
            if self.deployment_strategy.is_none() {
                return Err(ConfigError::Conflict(
                    "Must set the deployment strategy if bringing up or down cluster.",
                ));
            }
        } else if self.deployment_strategy.is_some() {
            return Err(ConfigError::Conflict(
                "Cannot set the deployment strategy if not bringing up or down cluster.",
            ));
        }

        if self.deployment_strategy == Some(DeploymentStrategy::Gke) {
            if self.test_mode == TestMode::Migration {
                return Err(ConfigError::Conflict(
                    "Cannot set deployment strategy to 'gke' for migration tests.",
                ));
            }
            forbid(
                &self.kube_version,
                "Cannot set kube-version when using deployment strategy 'gke'. Use gke-cluster-version.",
            )?;
            if self.gke_cluster_version.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Conflict(
                    "Must set gke-cluster-version when using deployment strategy 'gke'.",
                ));
            }
            forbid(
                &self.kube_feature_gates,
                "Cannot set feature gates when using deployment strategy 'gke'.",
            )?;
            if self.local_k8s_dir.is_none() && self.test_version.is_none() {
                return Err(ConfigError::Conflict(
                    "Must set either test-version or local k8s dir when using deployment strategy 'gke'.",
                ));
            }
        }

        if self.local_k8s_dir.is_some() {
            forbid(&self.kube_version, "Cannot set a kube version when using a local k8s dir.")?;
            forbid(&self.test_version, "Cannot set a test version when using a local k8s dir.")?;
        }

        Ok(())
    }
}

fn require(value: &Option<String>, flag: &'static str) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(ConfigError::Missing(flag)),
    }
}

fn require_str(value: &str, flag: &'static str) -> Result<(), ConfigError> {
    if value.is_empty() {
        Err(ConfigError::Missing(flag))
    } else {
        Ok(())
    }
}

fn forbid<T>(value: &Option<T>, message: &'static str) -> Result<(), ConfigError> {
    match value {
        Some(_) => Err(ConfigError::Conflict(message)),
        None => Ok(()),
    }
}
