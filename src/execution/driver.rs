//! Pipeline driver - orchestrates one provisioning, test and teardown run

use crate::{
    core::{
        DeploymentStrategy, Exports, Outcome, PipelineError, RunConfiguration, RunContext,
        SkipReason, TaskFailure, TaskSlot, TestMode, Workspace,
    },
    execution::{
        aggregate::AggregateResult,
        gate::{DependencyGate, GateReader, GateWriter},
        launcher::{task_group, TaskLauncher},
        plan::SetupPlan,
        teardown::{TeardownEntry, TeardownReport, TeardownStack},
    },
    external::{ClusterParams, DriverParams, ExternalOperations, OperationError, TestParams},
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Environment variable pointing later phases at the cluster's own kubectl
pub const KUBECTL_ENV: &str = "GCE_PD_KUBECTL";
/// Environment variable carrying feature gates for a new GCE cluster
pub const FEATURE_GATES_ENV: &str = "KUBE_FEATURE_GATES";

/// Sequential phases that run after setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DriverInstall,
    TestRun,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::DriverInstall => f.write_str("driver install"),
            Phase::TestRun => f.write_str("test run"),
        }
    }
}

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        active_slots: Vec<TaskSlot>,
    },
    TaskStarted {
        slot: TaskSlot,
    },
    TaskFinished {
        slot: TaskSlot,
        outcome: Outcome,
    },
    SetupFinished {
        failure: Option<TaskFailure>,
    },
    PhaseStarted {
        phase: Phase,
    },
    PhaseFailed {
        phase: Phase,
        error: String,
    },
    TeardownStarted {
        resources: usize,
    },
    ResourceReleased {
        resource: String,
        error: Option<String>,
    },
    RunFinished {
        run_id: Uuid,
        success: bool,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Terminal record of a run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Outcome of every setup slot, empty if the run never got to setup
    pub outcomes: BTreeMap<TaskSlot, Outcome>,
    pub teardown: TeardownReport,
    /// The first fatal error. Teardown failures never appear here.
    pub result: Result<(), PipelineError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.result.as_ref().err()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Runs setup concurrently, then driver install and tests, then teardown
pub struct PipelineDriver<O> {
    ops: Arc<O>,
    event_handlers: Vec<EventHandler>,
}

impl<O: ExternalOperations + 'static> PipelineDriver<O> {
    pub fn new(ops: O) -> Self {
        Self::from_arc(Arc::new(ops))
    }

    /// Create a driver sharing `ops` with the caller
    pub fn from_arc(ops: Arc<O>) -> Self {
        Self {
            ops,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    fn emit(&self, event: PipelineEvent) {
        for handler in &self.event_handlers {
            handler(&event);
        }
    }

    /// Execute one run. Teardown always happens before this returns.
    pub async fn run(&self, config: &RunConfiguration, workspace: &Workspace) -> RunReport {
        let started_at = Utc::now();
        let mut ctx = RunContext::new(config, workspace);
        let mut stack = TeardownStack::new();
        let mut outcomes = BTreeMap::new();

        info!("Starting integration run {}", ctx.run_id);

        let result = match config.validate() {
            Ok(()) => {
                for warning in config.warnings() {
                    warn!("{}", warning);
                }
                self.execute(config, &mut ctx, &mut stack, &mut outcomes)
                    .await
            }
            Err(e) => Err(PipelineError::Config(e)),
        };

        if let Err(e) = &result {
            error!("Integration run failed: {}", e);
        }

        self.emit(PipelineEvent::TeardownStarted {
            resources: stack.len(),
        });
        let teardown = stack
            .unwind_all_with(|record| {
                self.emit(PipelineEvent::ResourceReleased {
                    resource: record.resource.clone(),
                    error: record.error.clone(),
                })
            })
            .await;

        self.emit(PipelineEvent::RunFinished {
            run_id: ctx.run_id,
            success: result.is_ok(),
        });

        RunReport {
            run_id: ctx.run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            teardown,
            result,
        }
    }

    async fn execute(
        &self,
        config: &RunConfiguration,
        ctx: &mut RunContext,
        stack: &mut TeardownStack,
        outcomes: &mut BTreeMap<TaskSlot, Outcome>,
    ) -> Result<(), PipelineError> {
        let aggregate = self.run_setup(config, ctx).await;
        self.register_setup_teardown(config, ctx, &aggregate, stack);

        let failure = aggregate.first_failure().cloned();
        self.emit(PipelineEvent::SetupFinished {
            failure: failure.clone(),
        });
        *outcomes = aggregate.into_outcomes();

        if let Some(failure) = failure {
            return Err(failure.into());
        }

        self.install_driver(config, ctx, stack).await?;
        self.run_tests(config, ctx).await
    }

    /// Launch all four setup slots and wait for every outcome
    async fn run_setup(&self, config: &RunConfiguration, ctx: &RunContext) -> AggregateResult {
        let plan = SetupPlan::from_config(config);
        self.emit(PipelineEvent::RunStarted {
            run_id: ctx.run_id,
            active_slots: plan.active_slots(),
        });

        let (launcher, aggregator) = task_group(&TaskSlot::ALL);

        let gate = if plan.cluster_build {
            let (writer, reader) = DependencyGate::channel();
            self.launch_cluster_build(&launcher, config, ctx, writer);
            reader
        } else {
            launcher.skip(TaskSlot::ClusterBuild, SkipReason::NotRequired);
            DependencyGate::open()
        };

        if plan.test_build {
            self.launch_test_build(&launcher, config, ctx);
        } else {
            launcher.skip(TaskSlot::TestBuild, SkipReason::NotRequired);
        }

        if plan.driver_image {
            self.launch_image_push(&launcher, config, ctx);
        } else {
            launcher.skip(TaskSlot::DriverImage, SkipReason::NotRequired);
        }

        if plan.cluster_up {
            self.launch_cluster_up(&launcher, config, ctx, gate);
        } else {
            launcher.skip(TaskSlot::ClusterUp, SkipReason::NotRequired);
        }

        // Running tasks hold their own senders
        drop(launcher);

        info!("Waiting for {} setup task(s)", plan.active_slots().len());
        aggregator
            .collect(|slot, outcome| {
                self.emit(PipelineEvent::TaskFinished {
                    slot,
                    outcome: outcome.clone(),
                })
            })
            .await
    }

    fn launch_cluster_build(
        &self,
        launcher: &TaskLauncher,
        config: &RunConfiguration,
        ctx: &RunContext,
        gate: GateWriter,
    ) {
        let ops = self.ops.clone();
        let target = ctx.k8s_dir.clone();
        let version = config.kube_version.clone().unwrap_or_default();

        self.emit(PipelineEvent::TaskStarted {
            slot: TaskSlot::ClusterBuild,
        });
        launcher.launch(TaskSlot::ClusterBuild, async move {
            let result = build_source(ops.as_ref(), target, &version).await;
            gate.write(result.is_ok());
            outcome_of(TaskSlot::ClusterBuild, result.map(|()| Exports::new()))
        });
    }

    fn launch_test_build(&self, launcher: &TaskLauncher, config: &RunConfiguration, ctx: &RunContext) {
        let ops = self.ops.clone();
        let target = ctx.test_dir.clone();
        let version = config.test_version.clone().unwrap_or_default();

        self.emit(PipelineEvent::TaskStarted {
            slot: TaskSlot::TestBuild,
        });
        launcher.launch(TaskSlot::TestBuild, async move {
            let result = build_source(ops.as_ref(), target, &version).await;
            outcome_of(TaskSlot::TestBuild, result.map(|()| Exports::new()))
        });
    }

    fn launch_image_push(&self, launcher: &TaskLauncher, config: &RunConfiguration, ctx: &RunContext) {
        let ops = self.ops.clone();
        let image = config.staging_image.clone();
        let tag = ctx.staging_version.clone();

        self.emit(PipelineEvent::TaskStarted {
            slot: TaskSlot::DriverImage,
        });
        launcher.launch(TaskSlot::DriverImage, async move {
            let result = match image {
                Some(image) => ops.push_driver_image(&image, &tag).await,
                None => Err(OperationError::Config("no staging image to push to".to_string())),
            };
            outcome_of(TaskSlot::DriverImage, result.map(|()| Exports::new()))
        });
    }

    fn launch_cluster_up(
        &self,
        launcher: &TaskLauncher,
        config: &RunConfiguration,
        ctx: &RunContext,
        gate: GateReader,
    ) {
        let ops = self.ops.clone();
        let strategy = config.deployment_strategy;
        let params = cluster_params(config, ctx);
        let feature_gates = config.kube_feature_gates.clone();

        self.emit(PipelineEvent::TaskStarted {
            slot: TaskSlot::ClusterUp,
        });
        launcher.launch(TaskSlot::ClusterUp, async move {
            if !gate.read().await {
                info!("Skipping cluster bring-up because the cluster build failed");
                return Outcome::Skipped {
                    reason: SkipReason::UpstreamFailed(TaskSlot::ClusterBuild),
                };
            }

            let Some(strategy) = strategy else {
                return Outcome::failed(
                    TaskSlot::ClusterUp,
                    "deployment strategy must be set to 'gce' or 'gke'",
                );
            };

            let exports = cluster_exports(strategy, &params, feature_gates.as_deref()).await;
            let result = ops.cluster_up(strategy, &params, &exports).await;
            outcome_of(TaskSlot::ClusterUp, result.map(|()| exports))
        });
    }

    /// Merge exports of successful tasks and register teardown for the
    /// resources they acquired, in slot order
    fn register_setup_teardown(
        &self,
        config: &RunConfiguration,
        ctx: &mut RunContext,
        aggregate: &AggregateResult,
        stack: &mut TeardownStack,
    ) {
        for (_, outcome) in aggregate.iter() {
            if let Outcome::Succeeded { exports } = outcome {
                ctx.merge_exports(exports);
            }
        }

        if !config.teardown_cluster {
            return;
        }

        let image_pushed = aggregate
            .outcome(TaskSlot::DriverImage)
            .is_some_and(Outcome::is_succeeded);
        if let (true, Some(image)) = (image_pushed, config.staging_image.clone()) {
            let ops = self.ops.clone();
            let tag = ctx.staging_version.clone();
            stack.push(TeardownEntry::new(
                format!("image {}:{}", image, tag),
                move || async move { ops.delete_driver_image(&image, &tag).await },
            ));
        }

        let cluster_up = aggregate
            .outcome(TaskSlot::ClusterUp)
            .is_some_and(Outcome::is_succeeded);
        if let (true, Some(strategy)) = (cluster_up, config.deployment_strategy) {
            let ops = self.ops.clone();
            let params = cluster_params(config, ctx);
            let env = ctx.env.clone();
            stack.push(TeardownEntry::new(
                format!("cluster {} in {}", strategy, params.zone),
                move || async move { ops.cluster_down(strategy, &params, &env).await },
            ));
        }
    }

    async fn install_driver(
        &self,
        config: &RunConfiguration,
        ctx: &RunContext,
        stack: &mut TeardownStack,
    ) -> Result<(), PipelineError> {
        self.emit(PipelineEvent::PhaseStarted {
            phase: Phase::DriverInstall,
        });

        let params = DriverParams {
            image: match (&config.staging_image, config.do_driver_build) {
                (Some(image), true) => Some((image.clone(), ctx.staging_version.clone())),
                _ => None,
            },
            overlay: config.deploy_overlay_name.clone(),
            service_account_file: config.service_account_file.clone(),
        };

        if let Err(e) = self.ops.install_driver(&params, &ctx.env).await {
            self.emit(PipelineEvent::PhaseFailed {
                phase: Phase::DriverInstall,
                error: e.to_string(),
            });
            return Err(PipelineError::DriverInstall(e));
        }

        if config.teardown_driver {
            let ops = self.ops.clone();
            let env = ctx.env.clone();
            stack.push(TeardownEntry::new(
                format!("driver overlay {}", params.overlay),
                move || async move { ops.delete_driver(&params, &env).await },
            ));
        }
        Ok(())
    }

    async fn run_tests(&self, config: &RunConfiguration, ctx: &RunContext) -> Result<(), PipelineError> {
        self.emit(PipelineEvent::PhaseStarted {
            phase: Phase::TestRun,
        });

        let params = TestParams {
            test_dir: ctx.test_dir.clone(),
            focus: config.test_focus.clone(),
            zone: config.zone.clone(),
        };

        let result = match &config.test_mode {
            TestMode::Direct { storage_class_file } => {
                self.ops
                    .run_direct_tests(&params, storage_class_file, &ctx.env)
                    .await
            }
            TestMode::Migration => self.ops.run_migration_tests(&params, &ctx.env).await,
        };

        result.map_err(|e| {
            self.emit(PipelineEvent::PhaseFailed {
                phase: Phase::TestRun,
                error: e.to_string(),
            });
            PipelineError::TestRun(e)
        })
    }
}

fn cluster_params(config: &RunConfiguration, ctx: &RunContext) -> ClusterParams {
    ClusterParams {
        k8s_dir: ctx.k8s_dir.clone(),
        zone: config.zone.clone(),
        gke_cluster_version: config.gke_cluster_version.clone(),
    }
}

async fn build_source<O: ExternalOperations + ?Sized>(
    ops: &O,
    target: Option<PathBuf>,
    version: &str,
) -> Result<(), OperationError> {
    let target = target.ok_or_else(|| {
        OperationError::Config(format!("no directory to build Kubernetes {} in", version))
    })?;
    ops.download_and_build_source(&target, version).await
}

fn outcome_of(slot: TaskSlot, result: Result<Exports, OperationError>) -> Outcome {
    match result {
        Ok(exports) => {
            info!("{} succeeded", slot);
            Outcome::Succeeded { exports }
        }
        Err(e) => {
            error!("{} failed: {}", slot, e);
            Outcome::failed(slot, e.to_string())
        }
    }
}

/// Values a bring-up exports to every later phase
///
/// A GCE cluster is managed with the kubectl bundled in its Kubernetes tree
/// when one exists, and takes the configured feature gates.
pub async fn cluster_exports(
    strategy: DeploymentStrategy,
    params: &ClusterParams,
    feature_gates: Option<&str>,
) -> Exports {
    let mut exports = Exports::new();
    if strategy != DeploymentStrategy::Gce {
        return exports;
    }

    if let Some(k8s_dir) = &params.k8s_dir {
        let kubectl = k8s_dir.join("cluster").join("kubectl.sh");
        if tokio::fs::try_exists(&kubectl).await.unwrap_or(false) {
            exports.insert(KUBECTL_ENV.to_string(), kubectl.display().to_string());
        } else {
            warn!(
                "could not find cluster kubectl at {}, falling back to default kubectl",
                kubectl.display()
            );
        }
    }

    if let Some(gates) = feature_gates.filter(|g| !g.is_empty()) {
        info!("Set Kubernetes feature gates: {}", gates);
        exports.insert(FEATURE_GATES_ENV.to_string(), gates.to_string());
    }

    exports
}
