//! Test: Dependency Gate - bring-up waits on the cluster build

use crate::helpers::*;
use crate::mock_operations::MockOperations;
use k8s_integration::core::{SkipReason, TaskSlot};
use std::sync::Arc;
use std::time::Duration;

/// However slow the build, bring-up does not start before it ends
#[tokio::test]
async fn test_bringup_waits_for_slow_build() {
    let ops = Arc::new(MockOperations::new().with_build_delay("1.29.0", Duration::from_millis(150)));
    let result = run_with_mock(&full_config(), ops.clone()).await;
    assert_run_succeeded(&result);

    let timeline = ops.timeline();
    let build_end = timeline.iter().position(|e| e == "end BuildSource 1.29.0").unwrap();
    let up_start = timeline.iter().position(|e| e.starts_with("start ClusterUp")).unwrap();
    assert!(build_end < up_start, "{:?}", timeline);

    // The image push did not wait for anything
    let push_end = timeline.iter().position(|e| e.starts_with("end PushImage")).unwrap();
    assert!(push_end < build_end, "{:?}", timeline);
}

/// A build that fails late still skips bring-up rather than racing it
#[tokio::test]
async fn test_slow_failing_build_skips_bringup() {
    let ops = Arc::new(
        MockOperations::new()
            .failing_build("1.29.0")
            .with_build_delay("1.29.0", Duration::from_millis(100)),
    );
    let result = run_with_mock(&full_config(), ops.clone()).await;

    assert_acquisition_failed(&result, TaskSlot::ClusterBuild);
    assert_outcome_skipped(
        &result,
        TaskSlot::ClusterUp,
        SkipReason::UpstreamFailed(TaskSlot::ClusterBuild),
    );
    assert_eq!(ops.count(Op::ClusterUp), 0);
}

/// A built tree with no bring-up: the build still runs and nobody reads
/// its gate
#[tokio::test]
async fn test_build_without_bringup() {
    let mut config = full_config();
    config.bringup_cluster = false;
    config.teardown_cluster = false;
    config.deployment_strategy = None;

    let ops = Arc::new(MockOperations::new());
    let result = run_with_mock(&config, ops.clone()).await;

    assert_run_succeeded(&result);
    assert_outcome_succeeded(&result, TaskSlot::ClusterBuild);
    assert_outcome_skipped(&result, TaskSlot::ClusterUp, SkipReason::NotRequired);
    assert_eq!(ops.count(Op::ClusterUp), 0);
    assert_eq!(ops.count(Op::BuildSource), 2);
}
