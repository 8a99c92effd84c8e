//! Settings shared by the process-backed external operations

use std::path::PathBuf;

/// Configuration for running external tools
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Driver source tree (deploy scripts, Makefile, test configs)
    pub pkg_dir: PathBuf,

    /// Timeout for a single external command in seconds
    pub timeout_secs: u64,

    /// Directory the e2e suite writes its reports to
    pub artifacts_dir: Option<PathBuf>,
}

impl ToolConfig {
    pub fn new(pkg_dir: impl Into<PathBuf>) -> Self {
        Self {
            pkg_dir: pkg_dir.into(),
            timeout_secs: 10800,
            artifacts_dir: std::env::var_os("ARTIFACTS").map(PathBuf::from),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    /// Kustomize overlay directory for a deploy overlay name
    pub fn overlay_dir(&self, overlay: &str) -> PathBuf {
        self.pkg_dir
            .join("deploy/kubernetes/overlays")
            .join(overlay)
    }

    /// Directory holding storage class and generated test driver files
    pub fn test_config_dir(&self) -> PathBuf {
        self.pkg_dir.join("test/k8s-integration/config")
    }
}
