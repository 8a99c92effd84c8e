//! Which setup slots a run configuration needs

use crate::core::{RunConfiguration, TaskSlot};

/// The setup work needed for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPlan {
    pub cluster_build: bool,
    pub test_build: bool,
    pub driver_image: bool,
    pub cluster_up: bool,
}

impl SetupPlan {
    pub fn from_config(config: &RunConfiguration) -> Self {
        Self {
            // Without a kube version the cluster comes from GKE or a prebuilt local tree
            cluster_build: config.kube_version.is_some(),
            test_build: config.builds_separate_test_tree(),
            driver_image: config.do_driver_build,
            cluster_up: config.bringup_cluster,
        }
    }

    pub fn needs(&self, slot: TaskSlot) -> bool {
        match slot {
            TaskSlot::ClusterBuild => self.cluster_build,
            TaskSlot::TestBuild => self.test_build,
            TaskSlot::DriverImage => self.driver_image,
            TaskSlot::ClusterUp => self.cluster_up,
        }
    }

    /// Slots that will actually run an operation
    pub fn active_slots(&self) -> Vec<TaskSlot> {
        TaskSlot::ALL.into_iter().filter(|slot| self.needs(*slot)).collect()
    }
}
