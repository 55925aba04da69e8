//! GKE through Terraform and `gcloud`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::exec::{run_checked, CommandRunner, CommandSpec};
use crate::providers::traits::{
    CloudProvider, CloudProviderError, ClusterProvider, KubernetesCluster,
    KubernetesClusterStatus, ProviderSettings,
};
use crate::providers::{apply_infrastructure, terraform_for};

/// `gcloud container clusters describe --format json` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeCluster {
    pub name: String,
    pub status: String,
    pub endpoint: Option<String>,
    pub current_master_version: Option<String>,
    pub location: Option<String>,
}

impl GkeCluster {
    #[must_use]
    pub fn cluster_status(&self) -> KubernetesClusterStatus {
        match self.status.as_str() {
            "PROVISIONING" => KubernetesClusterStatus::Creating,
            "RUNNING" => KubernetesClusterStatus::Running,
            "RECONCILING" => KubernetesClusterStatus::Updating,
            "STOPPING" => KubernetesClusterStatus::Deleting,
            "ERROR" | "DEGRADED" => KubernetesClusterStatus::Error,
            _ => KubernetesClusterStatus::Unknown,
        }
    }
}

/// GCP GKE provider.
#[derive(Clone)]
pub struct GkeProvider {
    runner: Arc<dyn CommandRunner>,
    settings: ProviderSettings,
}

impl GkeProvider {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, settings: ProviderSettings) -> Self {
        Self { runner, settings }
    }

    /// Configured project, or the active `gcloud` project.
    fn project(&self) -> Result<String, CloudProviderError> {
        if let Some(project) = self.settings.gcp_project.as_deref().filter(|p| !p.is_empty()) {
            return Ok(project.to_string());
        }

        let spec = CommandSpec::new("gcloud").args(["config", "get-value", "project"]);
        let project = run_checked(self.runner.as_ref(), &spec)?;
        let project = project.trim();
        if project.is_empty() || project == "(unset)" {
            return Err(CloudProviderError::Config(
                "no GCP project configured; run `gcloud config set project <id>`".to_string(),
            ));
        }
        Ok(project.to_string())
    }

    fn describe(&self, name: &str, project: &str) -> Result<KubernetesCluster, CloudProviderError> {
        let spec = CommandSpec::new("gcloud").args([
            "container",
            "clusters",
            "describe",
            name,
            "--region",
            self.settings.region.as_str(),
            "--project",
            project,
            "--format",
            "json",
        ]);
        let stdout = run_checked(self.runner.as_ref(), &spec)?;
        let cluster: GkeCluster = serde_json::from_str(&stdout)?;

        Ok(KubernetesCluster {
            status: cluster.cluster_status(),
            region: cluster
                .location
                .unwrap_or_else(|| self.settings.region.clone()),
            name: cluster.name,
            endpoint: cluster.endpoint,
            version: cluster.current_master_version,
        })
    }
}

#[async_trait]
impl ClusterProvider for GkeProvider {
    fn kind(&self) -> CloudProvider {
        CloudProvider::Gcp
    }

    fn cluster_name(&self) -> &str {
        &self.settings.cluster_name
    }

    async fn provision(&self) -> Result<KubernetesCluster, CloudProviderError> {
        let project = self.project()?;
        info!(
            cluster = %self.settings.cluster_name,
            region = %self.settings.region,
            project = %project,
            "Provisioning GKE cluster"
        );

        let terraform = terraform_for(&self.runner, &self.settings)?;
        let vars = BTreeMap::from([
            ("project_id".to_string(), project.clone()),
            ("region".to_string(), self.settings.region.clone()),
            ("cluster_name".to_string(), self.settings.cluster_name.clone()),
        ]);
        let outputs = apply_infrastructure(&terraform, &vars)?;

        let name = outputs
            .get("cluster_name")
            .and_then(|o| o.value.as_str())
            .map_or_else(|| self.settings.cluster_name.clone(), str::to_string);

        let cluster = self.describe(&name, &project)?;
        if cluster.status == KubernetesClusterStatus::Error {
            return Err(CloudProviderError::ClusterFailed {
                name: cluster.name,
                status: cluster.status,
            });
        }
        Ok(cluster)
    }

    async fn configure_kubeconfig(
        &self,
        cluster: &KubernetesCluster,
    ) -> Result<(), CloudProviderError> {
        let project = self.project()?;
        let spec = CommandSpec::new("gcloud").args([
            "container",
            "clusters",
            "get-credentials",
            cluster.name.as_str(),
            "--region",
            cluster.region.as_str(),
            "--project",
            project.as_str(),
        ]);
        run_checked(self.runner.as_ref(), &spec)?;
        info!(cluster = %cluster.name, "Kubeconfig updated");
        Ok(())
    }
}
