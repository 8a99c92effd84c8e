//! Run context - values resolved before the run and values produced by setup tasks

use crate::core::config::RunConfiguration;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Environment values exported by a setup step for later phases
pub type Exports = BTreeMap<String, String>;

/// Scratch directories for downloaded Kubernetes trees
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Workspace rooted at `root`. Nothing is created on disk.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A fresh workspace under the system temp directory
    pub fn unique() -> Self {
        Self::at(std::env::temp_dir().join(format!("k8s-integration-{}", Uuid::new_v4())))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parent directory of the cluster's Kubernetes tree
    pub fn cluster_parent(&self) -> PathBuf {
        self.root.join("cluster")
    }

    /// Parent directory of the test Kubernetes tree
    pub fn test_parent(&self) -> PathBuf {
        self.root.join("test")
    }

    pub async fn create(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.cluster_parent()).await?;
        tokio::fs::create_dir_all(self.test_parent()).await
    }

    pub async fn remove(&self) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Explicit state passed between pipeline phases
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Unique id of this run
    pub run_id: Uuid,

    /// Tag the driver image is pushed under
    pub staging_version: String,

    /// Kubernetes tree used to bring the cluster up and down
    pub k8s_dir: Option<PathBuf>,

    /// Kubernetes tree the e2e binaries are run from
    pub test_dir: Option<PathBuf>,

    /// Values exported by setup tasks that have been confirmed successful
    pub env: Exports,
}

impl RunContext {
    pub fn new(config: &RunConfiguration, workspace: &Workspace) -> Self {
        let k8s_dir = if config.kube_version.is_some() {
            Some(workspace.cluster_parent().join("kubernetes"))
        } else {
            config.local_k8s_dir.clone()
        };

        let test_dir = if config.builds_separate_test_tree() {
            Some(workspace.test_parent().join("kubernetes"))
        } else {
            k8s_dir.clone()
        };

        Self {
            run_id: Uuid::new_v4(),
            staging_version: Uuid::new_v4().to_string(),
            k8s_dir,
            test_dir,
            env: Exports::new(),
        }
    }

    /// Merge values exported by a successful task
    pub fn merge_exports(&mut self, exports: &Exports) {
        for (key, value) in exports {
            self.env.insert(key.clone(), value.clone());
        }
    }
}
