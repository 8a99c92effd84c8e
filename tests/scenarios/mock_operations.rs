//! Mock external operations for deterministic, fast scenario tests

use async_trait::async_trait;
use k8s_integration::core::{DeploymentStrategy, Exports};
use k8s_integration::external::{
    ClusterParams, DriverParams, ExternalOperations, OperationError, TestParams,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// The kinds of operation the pipeline can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    BuildSource,
    PushImage,
    DeleteImage,
    ClusterUp,
    ClusterDown,
    InstallDriver,
    DeleteDriver,
    DirectTests,
    MigrationTests,
}

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    /// Operation-specific detail: version, image tag, test dir, ...
    pub detail: String,
    /// Environment the operation was given
    pub env: Exports,
}

/// Mock operations that record every call and fail on request
///
/// Builds are told apart by version, so a cluster build and a test build of
/// different versions can be failed or delayed independently.
#[derive(Default)]
pub struct MockOperations {
    calls: Mutex<Vec<Call>>,
    /// "start <op>" / "end <op>" markers in the order they happened
    timeline: Mutex<Vec<String>>,
    failing: HashSet<Op>,
    failing_versions: HashSet<String>,
    delays: HashMap<Op, Duration>,
    version_delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `op` fail
    pub fn failing(mut self, op: Op) -> Self {
        self.failing.insert(op);
        self
    }

    /// Make the source build of `version` fail
    pub fn failing_build(mut self, version: &str) -> Self {
        self.failing_versions.insert(version.to_string());
        self
    }

    pub fn with_delay(mut self, op: Op, delay: Duration) -> Self {
        self.delays.insert(op, delay);
        self
    }

    pub fn with_build_delay(mut self, version: &str, delay: Duration) -> Self {
        self.version_delays.insert(version.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    pub fn call(&self, op: Op) -> Option<Call> {
        self.calls().into_iter().find(|c| c.op == op)
    }

    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().unwrap().clone()
    }

    /// Highest number of operations that were running at the same time
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn invoke(&self, op: Op, detail: String, env: &Exports) -> Result<(), OperationError> {
        let marker = format!("{:?} {}", op, detail);
        self.calls.lock().unwrap().push(Call {
            op,
            detail: detail.clone(),
            env: env.clone(),
        });
        self.timeline.lock().unwrap().push(format!("start {}", marker));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = match op {
            Op::BuildSource => self.version_delays.get(&detail).copied(),
            _ => None,
        }
        .or_else(|| self.delays.get(&op).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.timeline.lock().unwrap().push(format!("end {}", marker));

        let fails = self.failing.contains(&op)
            || (op == Op::BuildSource && self.failing_versions.contains(&detail));
        if fails {
            Err(OperationError::Exit {
                command: format!("{:?}", op),
                code: 1,
                output: format!("mock failure for {}", detail),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ExternalOperations for MockOperations {
    async fn download_and_build_source(
        &self,
        _target_dir: &Path,
        version: &str,
    ) -> Result<(), OperationError> {
        self.invoke(Op::BuildSource, version.to_string(), &Exports::new()).await
    }

    async fn push_driver_image(&self, image: &str, tag: &str) -> Result<(), OperationError> {
        self.invoke(Op::PushImage, format!("{}:{}", image, tag), &Exports::new()).await
    }

    async fn delete_driver_image(&self, image: &str, tag: &str) -> Result<(), OperationError> {
        self.invoke(Op::DeleteImage, format!("{}:{}", image, tag), &Exports::new()).await
    }

    async fn cluster_up(
        &self,
        strategy: DeploymentStrategy,
        params: &ClusterParams,
        env: &Exports,
    ) -> Result<(), OperationError> {
        self.invoke(Op::ClusterUp, format!("{} {}", strategy, params.zone), env).await
    }

    async fn cluster_down(
        &self,
        strategy: DeploymentStrategy,
        params: &ClusterParams,
        env: &Exports,
    ) -> Result<(), OperationError> {
        self.invoke(Op::ClusterDown, format!("{} {}", strategy, params.zone), env).await
    }

    async fn install_driver(&self, params: &DriverParams, env: &Exports) -> Result<(), OperationError> {
        let image = params
            .image
            .as_ref()
            .map(|(image, tag)| format!("{}:{}", image, tag))
            .unwrap_or_else(|| "prebuilt".to_string());
        self.invoke(Op::InstallDriver, format!("{} {}", params.overlay, image), env).await
    }

    async fn delete_driver(&self, params: &DriverParams, env: &Exports) -> Result<(), OperationError> {
        self.invoke(Op::DeleteDriver, params.overlay.clone(), env).await
    }

    async fn run_direct_tests(
        &self,
        params: &TestParams,
        storage_class_file: &str,
        env: &Exports,
    ) -> Result<(), OperationError> {
        let test_dir = params
            .test_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        self.invoke(Op::DirectTests, format!("{} {}", storage_class_file, test_dir), env).await
    }

    async fn run_migration_tests(&self, params: &TestParams, env: &Exports) -> Result<(), OperationError> {
        self.invoke(Op::MigrationTests, params.focus.clone(), env).await
    }
}
