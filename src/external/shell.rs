//! Process-backed external operations (curl, make, gcloud, kustomize, ginkgo)

use crate::core::{DeploymentStrategy, Exports};
use crate::external::{
    test_driver, ClusterParams, CommandRunner, DriverParams, ExternalCommand, ExternalOperations,
    OperationError, TestParams, ToolConfig,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Image name the deploy overlays reference before it is rewritten
const IMAGE_PLACEHOLDER: &str = "gke.gcr.io/gcp-compute-persistent-disk-csi-driver";
/// Where a dockerized Kubernetes build leaves its binaries
const K8S_BUILD_BIN_DIR: &str = "_output/dockerized/bin/linux/amd64";
const GKE_CLUSTER_NAME: &str = "gcp-pd-csi-driver-test-cluster";
const K8S_REPO: &str = "https://github.com/kubernetes/kubernetes";
const TEST_SKIP: &str = "\\[Disruptive\\]|\\[Serial\\]|\\[Feature:.+\\]";
const MIGRATION_ARG: &str = "-storage.migratedPlugins=kubernetes.io/gce-pd";

/// Runs every external operation as a subprocess
#[derive(Debug, Clone)]
pub struct ShellOperations {
    config: ToolConfig,
    runner: CommandRunner,
}

impl ShellOperations {
    pub fn new(config: ToolConfig) -> Self {
        let runner = CommandRunner::new(config.timeout_secs);
        Self { config, runner }
    }

    async fn run(&self, command: ExternalCommand) -> Result<(), OperationError> {
        info!("Running {}", command.describe());
        self.runner.run(&command).await.map(|_| ())
    }

    fn push_image_command(&self, image: &str, tag: &str) -> ExternalCommand {
        ExternalCommand::new("make")
            .arg("-C")
            .arg(self.config.pkg_dir.display().to_string())
            .arg("push-container")
            .env("GCE_PD_CSI_STAGING_IMAGE", image)
            .env("GCE_PD_CSI_STAGING_VERSION", tag)
    }

    fn cluster_command(
        &self,
        strategy: DeploymentStrategy,
        up: bool,
        params: &ClusterParams,
        env: &Exports,
    ) -> Result<ExternalCommand, OperationError> {
        let command = match strategy {
            DeploymentStrategy::Gce => {
                let k8s_dir = params.k8s_dir.as_ref().ok_or_else(|| {
                    OperationError::Config("no Kubernetes directory to manage a gce cluster with".to_string())
                })?;
                let script = if up { "e2e-up.sh" } else { "e2e-down.sh" };
                ExternalCommand::new(k8s_dir.join("hack/e2e-internal").join(script).display().to_string())
                    .current_dir(k8s_dir)
                    .env("KUBE_GCE_ZONE", params.zone.as_str())
            }
            DeploymentStrategy::Gke => {
                let verb = if up { "create" } else { "delete" };
                let mut command = ExternalCommand::new("gcloud")
                    .args(["container", "clusters", verb, GKE_CLUSTER_NAME])
                    .args(["--zone", params.zone.as_str()]);
                if up {
                    if let Some(version) = &params.gke_cluster_version {
                        command = command.args(["--cluster-version", version.as_str()]);
                    }
                    command = command.args(["--num-nodes", "3"]);
                }
                command.arg("--quiet")
            }
        };
        Ok(command.envs(env))
    }

    fn deploy_script(&self, script: &str) -> String {
        self.config
            .pkg_dir
            .join("deploy/kubernetes")
            .join(script)
            .display()
            .to_string()
    }

    fn install_commands(&self, params: &DriverParams, env: &Exports) -> Vec<ExternalCommand> {
        let mut commands = Vec::new();

        if let Some((image, tag)) = &params.image {
            commands.push(
                ExternalCommand::new("kustomize")
                    .args(["edit", "set", "image"])
                    .arg(format!("{}={}:{}", IMAGE_PLACEHOLDER, image, tag))
                    .current_dir(self.config.overlay_dir(&params.overlay)),
            );
        }

        let sa_dir = params
            .service_account_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        commands.push(
            ExternalCommand::new(self.deploy_script("deploy-driver.sh"))
                .arg("--skip-sa-check")
                .env("GCE_PD_SA_DIR", sa_dir.display().to_string())
                .env("GCE_PD_DRIVER_VERSION", params.overlay.as_str())
                .envs(env),
        );

        commands
    }

    fn delete_command(&self, params: &DriverParams, env: &Exports) -> ExternalCommand {
        ExternalCommand::new(self.deploy_script("delete-driver.sh"))
            .env("GCE_PD_DRIVER_VERSION", params.overlay.as_str())
            .envs(env)
    }

    fn test_command(
        &self,
        params: &TestParams,
        test_config_arg: &str,
        env: &Exports,
    ) -> Result<ExternalCommand, OperationError> {
        let test_dir = params.test_dir.as_ref().ok_or_else(|| {
            OperationError::Config("no Kubernetes directory to run tests from".to_string())
        })?;
        let bin_dir = test_dir.join(K8S_BUILD_BIN_DIR);

        let report_dir = self
            .config
            .artifacts_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();

        let mut command = ExternalCommand::new(bin_dir.join("ginkgo").display().to_string())
            .arg("-p")
            .arg(format!("-focus={}", params.focus))
            .arg(format!("-skip={}", TEST_SKIP))
            .arg(bin_dir.join("e2e.test").display().to_string())
            .arg("--")
            .arg(format!("-report-dir={}", report_dir))
            .arg("-provider=gce")
            .arg("-node-os-distro=cos")
            .arg(format!("-gce-zone={}", params.zone))
            .arg(test_config_arg)
            .current_dir(test_dir);

        if let Some(home) = std::env::var_os("HOME") {
            command = command.env(
                "KUBECONFIG",
                PathBuf::from(home).join(".kube/config").display().to_string(),
            );
        }
        Ok(command.envs(env))
    }

    async fn download_source(&self, target_dir: &Path, version: &str) -> Result<(), OperationError> {
        let parent = target_dir.parent().ok_or_else(|| {
            OperationError::Config(format!("{} has no parent directory", target_dir.display()))
        })?;

        // Archives of master carry no version, which changes the APIs the
        // cluster serves, so master is cloned in full.
        if version == "master" {
            return self
                .run(
                    ExternalCommand::new("git")
                        .args(["clone", K8S_REPO])
                        .arg(target_dir.display().to_string()),
                )
                .await;
        }

        let tarball = parent.join(format!("kubernetes-{}.tar.gz", version));
        self.run(
            ExternalCommand::new("curl")
                .arg("-L")
                .arg(format!("{}/archive/v{}.tar.gz", K8S_REPO, version))
                .arg("-o")
                .arg(tarball.display().to_string()),
        )
        .await?;
        self.run(
            ExternalCommand::new("tar")
                .arg("-C")
                .arg(parent.display().to_string())
                .arg("-xzf")
                .arg(tarball.display().to_string()),
        )
        .await?;

        let extracted = parent.join(format!("kubernetes-{}", version));
        tokio::fs::rename(&extracted, target_dir).await.map_err(|e| {
            OperationError::io(
                format!("failed to move {} to {}", extracted.display(), target_dir.display()),
                e,
            )
        })
    }
}

#[async_trait]
impl ExternalOperations for ShellOperations {
    async fn download_and_build_source(
        &self,
        target_dir: &Path,
        version: &str,
    ) -> Result<(), OperationError> {
        self.download_source(target_dir, version).await?;
        self.run(
            ExternalCommand::new("make")
                .arg("-C")
                .arg(target_dir.display().to_string())
                .arg("quick-release"),
        )
        .await
    }

    async fn push_driver_image(&self, image: &str, tag: &str) -> Result<(), OperationError> {
        self.run(self.push_image_command(image, tag)).await
    }

    async fn delete_driver_image(&self, image: &str, tag: &str) -> Result<(), OperationError> {
        self.run(
            ExternalCommand::new("gcloud")
                .args(["container", "images", "delete"])
                .arg(format!("{}:{}", image, tag))
                .arg("--quiet"),
        )
        .await
    }

    async fn cluster_up(
        &self,
        strategy: DeploymentStrategy,
        params: &ClusterParams,
        env: &Exports,
    ) -> Result<(), OperationError> {
        self.run(self.cluster_command(strategy, true, params, env)?).await
    }

    async fn cluster_down(
        &self,
        strategy: DeploymentStrategy,
        params: &ClusterParams,
        env: &Exports,
    ) -> Result<(), OperationError> {
        self.run(self.cluster_command(strategy, false, params, env)?).await
    }

    async fn install_driver(&self, params: &DriverParams, env: &Exports) -> Result<(), OperationError> {
        for command in self.install_commands(params, env) {
            self.run(command).await?;
        }
        Ok(())
    }

    async fn delete_driver(&self, params: &DriverParams, env: &Exports) -> Result<(), OperationError> {
        self.run(self.delete_command(params, env)).await
    }

    async fn run_direct_tests(
        &self,
        params: &TestParams,
        storage_class_file: &str,
        env: &Exports,
    ) -> Result<(), OperationError> {
        let driver_config =
            test_driver::generate_driver_config_file(&self.config.test_config_dir(), storage_class_file)
                .await?;
        let arg = format!("-storage.testdriver={}", driver_config.display());
        self.run(self.test_command(params, &arg, env)?).await
    }

    async fn run_migration_tests(&self, params: &TestParams, env: &Exports) -> Result<(), OperationError> {
        self.run(self.test_command(params, MIGRATION_ARG, env)?).await
    }
}
