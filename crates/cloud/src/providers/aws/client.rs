//! EKS through Terraform and the `aws` CLI.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::models::DescribeClusterResponse;
use crate::exec::{run_checked, CommandRunner, CommandSpec};
use crate::providers::traits::{
    CloudProvider, CloudProviderError, ClusterProvider, KubernetesCluster,
    KubernetesClusterStatus, ProviderSettings,
};
use crate::providers::{apply_infrastructure, terraform_for};

/// Resolve the AWS region: explicit value first, then the CLI profile.
///
/// # Errors
///
/// Returns [`CloudProviderError::Config`] when no region is configured.
pub fn resolve_aws_region(
    runner: &dyn CommandRunner,
    explicit: Option<&str>,
) -> Result<String, CloudProviderError> {
    if let Some(region) = explicit.map(str::trim).filter(|r| !r.is_empty()) {
        return Ok(region.to_string());
    }

    let spec = CommandSpec::new("aws").args(["configure", "get", "region"]);
    let output = runner.run(&spec)?;
    let region = output.stdout.trim();

    if output.success() && !region.is_empty() {
        info!(region, "Using region from AWS CLI configuration");
        Ok(region.to_string())
    } else {
        Err(CloudProviderError::Config(
            "AWS region is not set; pass --region or run `aws configure`".to_string(),
        ))
    }
}

/// AWS EKS provider.
#[derive(Clone)]
pub struct EksProvider {
    runner: Arc<dyn CommandRunner>,
    settings: ProviderSettings,
}

impl EksProvider {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, settings: ProviderSettings) -> Self {
        Self { runner, settings }
    }

    fn describe(&self, name: &str) -> Result<KubernetesCluster, CloudProviderError> {
        let spec = CommandSpec::new("aws").args([
            "eks",
            "describe-cluster",
            "--name",
            name,
            "--region",
            self.settings.region.as_str(),
            "--output",
            "json",
        ]);
        let stdout = run_checked(self.runner.as_ref(), &spec)?;
        let response: DescribeClusterResponse = serde_json::from_str(&stdout)?;
        let cluster = response.cluster;

        Ok(KubernetesCluster {
            status: cluster.cluster_status(),
            region: cluster
                .region()
                .unwrap_or(&self.settings.region)
                .to_string(),
            name: cluster.name,
            endpoint: cluster.endpoint,
            version: cluster.version,
        })
    }
}

#[async_trait]
impl ClusterProvider for EksProvider {
    fn kind(&self) -> CloudProvider {
        CloudProvider::Aws
    }

    fn cluster_name(&self) -> &str {
        &self.settings.cluster_name
    }

    async fn provision(&self) -> Result<KubernetesCluster, CloudProviderError> {
        info!(
            cluster = %self.settings.cluster_name,
            region = %self.settings.region,
            "Provisioning EKS cluster"
        );

        let terraform = terraform_for(&self.runner, &self.settings)?;
        let vars = BTreeMap::from([
            ("region".to_string(), self.settings.region.clone()),
            ("cluster_name".to_string(), self.settings.cluster_name.clone()),
        ]);
        let outputs = apply_infrastructure(&terraform, &vars)?;

        let name = outputs
            .get("cluster_name")
            .and_then(|o| o.value.as_str())
            .map_or_else(|| self.settings.cluster_name.clone(), str::to_string);

        let cluster = self.describe(&name)?;
        if matches!(
            cluster.status,
            KubernetesClusterStatus::Error | KubernetesClusterStatus::Deleting
        ) {
            return Err(CloudProviderError::ClusterFailed {
                name: cluster.name,
                status: cluster.status,
            });
        }
        if cluster.status != KubernetesClusterStatus::Running {
            warn!(cluster = %cluster.name, status = %cluster.status, "EKS cluster not yet active");
        }
        Ok(cluster)
    }

    async fn configure_kubeconfig(
        &self,
        cluster: &KubernetesCluster,
    ) -> Result<(), CloudProviderError> {
        let spec = CommandSpec::new("aws").args([
            "eks",
            "update-kubeconfig",
            "--name",
            cluster.name.as_str(),
            "--region",
            cluster.region.as_str(),
        ]);
        run_checked(self.runner.as_ref(), &spec)?;
        info!(cluster = %cluster.name, "Kubeconfig updated");
        Ok(())
    }
}
