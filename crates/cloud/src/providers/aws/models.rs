//! `aws eks` JSON output models.

use serde::Deserialize;

use crate::providers::traits::KubernetesClusterStatus;

/// `aws eks describe-cluster` output.
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeClusterResponse {
    pub cluster: EksCluster,
}

/// EKS cluster information.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksCluster {
    /// Cluster name.
    pub name: String,
    /// Cluster ARN.
    pub arn: String,
    /// Kubernetes version.
    pub version: Option<String>,
    /// Cluster status.
    pub status: String,
    /// API server endpoint.
    pub endpoint: Option<String>,
    /// Created at timestamp.
    pub created_at: Option<String>,
}

impl EksCluster {
    #[must_use]
    pub fn cluster_status(&self) -> KubernetesClusterStatus {
        match self.status.as_str() {
            "CREATING" | "PENDING" => KubernetesClusterStatus::Creating,
            "ACTIVE" => KubernetesClusterStatus::Running,
            "UPDATING" => KubernetesClusterStatus::Updating,
            "DELETING" => KubernetesClusterStatus::Deleting,
            "FAILED" => KubernetesClusterStatus::Error,
            _ => KubernetesClusterStatus::Unknown,
        }
    }

    /// Region segment of the ARN.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.arn.split(':').nth(3).filter(|r| !r.is_empty())
    }
}
