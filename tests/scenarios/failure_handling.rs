//! Test: Failure Handling - setup, install and test failures

use crate::helpers::*;
use crate::mock_operations::MockOperations;
use k8s_integration::core::{PipelineError, SkipReason, TaskSlot};
use k8s_integration::execution::{Phase, PipelineEvent};
use std::sync::Arc;
use std::time::Duration;

/// A failed cluster build keeps the cluster from coming up, but the other
/// setup tasks still run to completion and are cleaned up
#[tokio::test]
async fn test_cluster_build_failure_skips_bringup() {
    let ops = Arc::new(MockOperations::new().failing_build("1.29.0"));
    let result = run_with_mock(&full_config(), ops.clone()).await;

    assert_acquisition_failed(&result, TaskSlot::ClusterBuild);
    assert_outcome_failed(&result, TaskSlot::ClusterBuild);
    assert_outcome_succeeded(&result, TaskSlot::TestBuild);
    assert_outcome_succeeded(&result, TaskSlot::DriverImage);
    assert_outcome_skipped(
        &result,
        TaskSlot::ClusterUp,
        SkipReason::UpstreamFailed(TaskSlot::ClusterBuild),
    );

    assert_eq!(ops.count(Op::ClusterUp), 0);
    assert_eq!(ops.count(Op::InstallDriver), 0);
    assert_eq!(ops.count(Op::DirectTests), 0);

    // Only the pushed image was acquired
    let released = released(&result);
    assert_eq!(released.len(), 1);
    assert!(released[0].starts_with("image "));
    assert_eq!(ops.count(Op::ClusterDown), 0);
    assert_eq!(ops.count(Op::DeleteImage), 1);
}

/// When several setup tasks fail, the earliest slot is the one reported,
/// no matter which finished first
#[tokio::test]
async fn test_first_failure_by_slot_order() {
    let ops = Arc::new(
        MockOperations::new()
            .failing_build("1.28.0")
            .with_build_delay("1.28.0", Duration::from_millis(100))
            .failing(Op::PushImage),
    );
    let result = run_with_mock(&full_config(), ops.clone()).await;

    assert_acquisition_failed(&result, TaskSlot::TestBuild);
    assert_outcome_failed(&result, TaskSlot::DriverImage);

    // The cluster still came up, so it still comes down
    assert_outcome_succeeded(&result, TaskSlot::ClusterUp);
    assert_eq!(released(&result), vec!["cluster gce in us-central1-c".to_string()]);
    assert_eq!(ops.count(Op::DeleteImage), 0);
}

/// A failed bring-up never registers cluster teardown
#[tokio::test]
async fn test_bringup_failure() {
    let ops = Arc::new(MockOperations::new().failing(Op::ClusterUp));
    let result = run_with_mock(&full_config(), ops.clone()).await;

    assert_acquisition_failed(&result, TaskSlot::ClusterUp);
    assert_eq!(ops.count(Op::ClusterDown), 0);
    assert_eq!(ops.count(Op::InstallDriver), 0);

    let released = released(&result);
    assert_eq!(released.len(), 1);
    assert!(released[0].starts_with("image "));

    let setup = result
        .events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::SetupFinished { failure } => Some(failure.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(setup.map(|f| f.slot), Some(TaskSlot::ClusterUp));
}

/// A failed install stops the run before tests; the cluster and image are
/// still released, the driver is not
#[tokio::test]
async fn test_driver_install_failure() {
    let ops = Arc::new(MockOperations::new().failing(Op::InstallDriver));
    let result = run_with_mock(&full_config(), ops.clone()).await;

    assert!(matches!(result.report.error(), Some(PipelineError::DriverInstall(_))));
    assert_eq!(ops.count(Op::DirectTests), 0);
    assert_eq!(ops.count(Op::DeleteDriver), 0);

    let released = released(&result);
    assert_eq!(released.len(), 2);
    assert_eq!(released[0], "cluster gce in us-central1-c");
    assert!(released[1].starts_with("image "));

    assert!(result.events.iter().any(|e| matches!(
        e,
        PipelineEvent::PhaseFailed {
            phase: Phase::DriverInstall,
            ..
        }
    )));
}

/// A failing suite and a failing cleanup: the test error is what the run
/// reports, and every resource is still attempted
#[tokio::test]
async fn test_test_failure_with_failing_cleanup() {
    let ops = Arc::new(
        MockOperations::new()
            .failing(Op::DirectTests)
            .failing(Op::ClusterDown),
    );
    let result = run_with_mock(&full_config(), ops.clone()).await;

    assert!(matches!(result.report.error(), Some(PipelineError::TestRun(_))));
    assert_eq!(released(&result).len(), 3);
    assert_eq!(ops.count(Op::DeleteDriver), 1);
    assert_eq!(ops.count(Op::ClusterDown), 1);
    assert_eq!(ops.count(Op::DeleteImage), 1);

    let failures: Vec<&str> = result
        .report
        .teardown
        .failures()
        .map(|r| r.resource.as_str())
        .collect();
    assert_eq!(failures, vec!["cluster gce in us-central1-c"]);
    assert!(matches!(
        result.events.last(),
        Some(PipelineEvent::RunFinished { success: false, .. })
    ));
}

/// An invalid configuration fails before any external operation runs
#[tokio::test]
async fn test_invalid_configuration_runs_nothing() {
    let mut config = full_config();
    config.staging_image = None;

    let ops = Arc::new(MockOperations::new());
    let result = run_with_mock(&config, ops.clone()).await;

    assert!(matches!(result.report.error(), Some(PipelineError::Config(_))));
    assert!(ops.calls().is_empty());
    assert!(result.report.outcomes.is_empty());
    assert!(result.report.teardown.is_empty());
    assert!(!result
        .events
        .iter()
        .any(|e| matches!(e, PipelineEvent::TaskStarted { .. })));
}

/// Every setup task reports even when all of them fail
#[tokio::test]
async fn test_all_setup_failures_reported() {
    let ops = Arc::new(
        MockOperations::new()
            .failing(Op::BuildSource)
            .failing(Op::PushImage),
    );
    let result = run_with_mock(&full_config(), ops.clone()).await;

    assert_acquisition_failed(&result, TaskSlot::ClusterBuild);
    assert_eq!(result.report.outcomes.len(), 4);
    assert_outcome_failed(&result, TaskSlot::TestBuild);
    assert_outcome_failed(&result, TaskSlot::DriverImage);
    assert_outcome_skipped(
        &result,
        TaskSlot::ClusterUp,
        SkipReason::UpstreamFailed(TaskSlot::ClusterBuild),
    );
    assert!(result.report.teardown.is_empty());
}
