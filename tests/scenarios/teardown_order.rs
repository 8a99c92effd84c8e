//! Test: Teardown - what gets released, and in which order

use crate::helpers::*;
use crate::mock_operations::MockOperations;
use std::sync::Arc;

/// Cleanup registered for a resource always runs after the operations that
/// use it, and in reverse order of acquisition
#[tokio::test]
async fn test_teardown_runs_after_tests() {
    let ops = Arc::new(MockOperations::new());
    let result = run_with_mock(&full_config(), ops.clone()).await;
    assert_run_succeeded(&result);

    let tests = position(&ops, Op::DirectTests);
    let driver = position(&ops, Op::DeleteDriver);
    let cluster = position(&ops, Op::ClusterDown);
    let image = position(&ops, Op::DeleteImage);
    assert!(tests < driver && driver < cluster && cluster < image);
}

/// Keeping the cluster also keeps the pushed image
#[tokio::test]
async fn test_keep_cluster() {
    let mut config = full_config();
    config.teardown_cluster = false;

    let ops = Arc::new(MockOperations::new());
    let result = run_with_mock(&config, ops.clone()).await;

    assert_run_succeeded(&result);
    assert_eq!(released(&result), vec!["driver overlay dev".to_string()]);
    assert_eq!(ops.count(Op::ClusterDown), 0);
    assert_eq!(ops.count(Op::DeleteImage), 0);
}

#[tokio::test]
async fn test_keep_driver() {
    let mut config = full_config();
    config.teardown_driver = false;

    let ops = Arc::new(MockOperations::new());
    let result = run_with_mock(&config, ops.clone()).await;

    assert_run_succeeded(&result);
    assert_eq!(released(&result).len(), 2);
    assert_eq!(ops.count(Op::DeleteDriver), 0);
}

#[tokio::test]
async fn test_keep_everything() {
    let mut config = full_config();
    config.teardown_cluster = false;
    config.teardown_driver = false;

    let ops = Arc::new(MockOperations::new());
    let result = run_with_mock(&config, ops.clone()).await;

    assert_run_succeeded(&result);
    assert!(result.report.teardown.is_empty());
    for op in [Op::DeleteDriver, Op::ClusterDown, Op::DeleteImage] {
        assert_eq!(ops.count(op), 0, "{:?} should not have run", op);
    }
}

/// Against an existing cluster with a prebuilt driver, only the driver is
/// acquired and released
#[tokio::test]
async fn test_existing_cluster_prebuilt_driver() {
    let yaml = r#"
bringup_cluster: false
teardown_cluster: false
do_driver_build: false
zone: us-central1-c
local_k8s_dir: /home/prow/go/src/k8s.io/kubernetes
service_account_file: /etc/service-account/key.json
deploy_overlay_name: prow-gke-release-staging-rc
test_focus: External.Storage
test_mode:
  mode: migration
pkg_dir: /go/src/driver
"#;
    let ops = Arc::new(MockOperations::new());
    let result = run_with_mock(&config_from(yaml), ops.clone()).await;

    assert_run_succeeded(&result);
    assert_eq!(
        ops.ops(),
        vec![Op::InstallDriver, Op::MigrationTests, Op::DeleteDriver]
    );
    assert_eq!(
        ops.call(Op::InstallDriver).unwrap().detail,
        "prow-gke-release-staging-rc prebuilt"
    );
    assert_eq!(
        released(&result),
        vec!["driver overlay prow-gke-release-staging-rc".to_string()]
    );
}

/// Asking to tear down a cluster this run did not bring up leaves the
/// existing cluster alone
#[tokio::test]
async fn test_teardown_of_existing_cluster_is_not_attempted() {
    let yaml = r#"
bringup_cluster: false
zone: us-central1-c
local_k8s_dir: /home/prow/go/src/k8s.io/kubernetes
deployment_strategy: gce
staging_image: gcr.io/test-project/gcp-persistent-disk-csi-driver
service_account_file: /etc/service-account/key.json
deploy_overlay_name: dev
test_focus: External.Storage
test_mode:
  mode: direct
  storage_class_file: sc-standard.yaml
pkg_dir: /go/src/driver
"#;
    let config = config_from(yaml);
    assert_eq!(config.warnings().len(), 1);

    let ops = Arc::new(MockOperations::new());
    let result = run_with_mock(&config, ops.clone()).await;

    assert_run_succeeded(&result);
    assert_eq!(ops.count(Op::ClusterUp), 0);
    assert_eq!(ops.count(Op::ClusterDown), 0);

    // The image this run pushed is still removed
    let released = released(&result);
    assert_eq!(released.len(), 2);
    assert_eq!(released[0], "driver overlay dev");
    assert!(released[1].starts_with("image "));
}
