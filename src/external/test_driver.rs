//! Test driver definition consumed by the Kubernetes external storage suite

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::external::OperationError;

const DRIVER_NAME: &str = "pd.csi.storage.gke.io";
const GENERATED_FILE_NAME: &str = "test-driver.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestDriverConfig {
    pub storage_class: StorageClassSource,
    pub driver_info: DriverInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageClassSource {
    pub from_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriverInfo {
    pub name: String,
    pub supported_fs_type: BTreeMap<String, BTreeMap<String, String>>,
    pub capabilities: BTreeMap<String, bool>,
    pub supported_size_range: SizeRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SizeRange {
    pub min: String,
    pub max: String,
}

impl TestDriverConfig {
    /// Driver definition for a storage class file
    pub fn for_storage_class(storage_class_path: &Path) -> Self {
        let supported_fs_type = ["ext2", "ext3", "ext4", "xfs"]
            .into_iter()
            .map(|fs| (fs.to_string(), BTreeMap::new()))
            .collect();

        let capabilities = [
            "persistence",
            "block",
            "fsGroup",
            "exec",
            "multipods",
            "topology",
            "controllerExpansion",
            "nodeExpansion",
        ]
        .into_iter()
        .map(|cap| (cap.to_string(), true))
        .collect();

        Self {
            storage_class: StorageClassSource {
                from_file: storage_class_path.display().to_string(),
            },
            driver_info: DriverInfo {
                name: DRIVER_NAME.to_string(),
                supported_fs_type,
                capabilities,
                supported_size_range: SizeRange {
                    min: "5Gi".to_string(),
                    max: "64Ti".to_string(),
                },
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String, OperationError> {
        serde_yaml::to_string(self)
            .map_err(|e| OperationError::Config(format!("failed to render test driver config: {}", e)))
    }
}

/// Write the test driver file for `storage_class_file` into `config_dir`
/// and return its path
pub async fn generate_driver_config_file(
    config_dir: &Path,
    storage_class_file: &str,
) -> Result<PathBuf, OperationError> {
    let storage_class_path = config_dir.join(storage_class_file);
    let yaml = TestDriverConfig::for_storage_class(&storage_class_path).to_yaml()?;

    let target = config_dir.join(GENERATED_FILE_NAME);
    tokio::fs::write(&target, yaml)
        .await
        .map_err(|e| OperationError::io(format!("failed to write {}", target.display()), e))?;
    Ok(target)
}
