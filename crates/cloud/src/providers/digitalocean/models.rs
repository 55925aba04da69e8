//! `doctl` JSON output models.

use serde::Deserialize;

use crate::providers::traits::KubernetesClusterStatus;

/// A DOKS cluster as printed by `doctl kubernetes cluster ... -o json`.
#[derive(Debug, Clone, Deserialize)]
pub struct DoCluster {
    pub id: String,
    pub name: String,
    pub region: String,
    pub version: Option<String>,
    pub endpoint: Option<String>,
    pub status: DoClusterStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoClusterStatus {
    pub state: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl DoCluster {
    #[must_use]
    pub fn cluster_status(&self) -> KubernetesClusterStatus {
        match self.status.state.as_str() {
            "provisioning" => KubernetesClusterStatus::Creating,
            "running" => KubernetesClusterStatus::Running,
            "upgrading" => KubernetesClusterStatus::Updating,
            "deleting" | "deleted" => KubernetesClusterStatus::Deleting,
            "degraded" | "error" | "invalid" => KubernetesClusterStatus::Error,
            _ => KubernetesClusterStatus::Unknown,
        }
    }
}
