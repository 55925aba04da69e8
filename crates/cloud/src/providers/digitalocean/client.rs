//! DOKS through `doctl`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::models::DoCluster;
use crate::exec::{run_checked, CommandRunner, CommandSpec};
use crate::poll::{poll_until, Probe};
use crate::providers::traits::{
    CloudProvider, CloudProviderError, ClusterProvider, KubernetesCluster,
    KubernetesClusterStatus, ProviderSettings,
};

/// DigitalOcean Kubernetes provider.
#[derive(Clone)]
pub struct DoksProvider {
    runner: Arc<dyn CommandRunner>,
    settings: ProviderSettings,
}

impl DoksProvider {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, settings: ProviderSettings) -> Self {
        Self { runner, settings }
    }

    fn doctl<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Result<String, CloudProviderError> {
        let spec = CommandSpec::new("doctl").args(args);
        Ok(run_checked(self.runner.as_ref(), &spec)?)
    }

    fn doctl_json<'a>(
        &self,
        args: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<DoCluster>, CloudProviderError> {
        let stdout = self.doctl(args)?;
        Ok(serde_json::from_str(&stdout)?)
    }

    fn ensure_authenticated(&self) -> Result<(), CloudProviderError> {
        self.doctl(["account", "get", "-o", "json"]).map_err(|_| {
            CloudProviderError::Config(
                "doctl is not authenticated; run `doctl auth init`".to_string(),
            )
        })?;
        Ok(())
    }

    fn find_existing(&self) -> Result<Option<DoCluster>, CloudProviderError> {
        let clusters = self.doctl_json(["kubernetes", "cluster", "list", "-o", "json"])?;
        Ok(clusters
            .into_iter()
            .find(|c| c.name == self.settings.cluster_name))
    }

    fn create(&self) -> Result<DoCluster, CloudProviderError> {
        let pool = format!(
            "name={}-pool;size={};count={}",
            self.settings.cluster_name, self.settings.node_size, self.settings.node_count
        );
        info!(
            cluster = %self.settings.cluster_name,
            region = %self.settings.region,
            node_pool = %pool,
            "Creating DOKS cluster"
        );

        self.doctl_json([
            "kubernetes",
            "cluster",
            "create",
            self.settings.cluster_name.as_str(),
            "--region",
            self.settings.region.as_str(),
            "--node-pool",
            pool.as_str(),
            "--wait=false",
            "-o",
            "json",
        ])?
        .into_iter()
        .next()
        .ok_or_else(|| CloudProviderError::NotFound(self.settings.cluster_name.clone()))
    }

    fn get(&self, id: &str) -> Result<DoCluster, CloudProviderError> {
        self.doctl_json(["kubernetes", "cluster", "get", id, "-o", "json"])?
            .into_iter()
            .next()
            .ok_or_else(|| CloudProviderError::NotFound(id.to_string()))
    }

    async fn wait_running(&self, id: &str) -> Result<DoCluster, CloudProviderError> {
        let what = format!("cluster {} to be running", self.settings.cluster_name);
        poll_until(&self.settings.cluster_poll, &what, |_| {
            let cluster = self.get(id)?;
            match cluster.cluster_status() {
                KubernetesClusterStatus::Running => Ok(Probe::Ready(cluster)),
                KubernetesClusterStatus::Error => Err(CloudProviderError::ClusterFailed {
                    name: cluster.name,
                    status: KubernetesClusterStatus::Error,
                }),
                _ => Ok(Probe::Pending(cluster.status.state)),
            }
        })
        .await
    }

    fn to_cluster(cluster: DoCluster) -> KubernetesCluster {
        KubernetesCluster {
            status: cluster.cluster_status(),
            name: cluster.name,
            region: cluster.region,
            endpoint: cluster.endpoint,
            version: cluster.version,
        }
    }
}

#[async_trait]
impl ClusterProvider for DoksProvider {
    fn kind(&self) -> CloudProvider {
        CloudProvider::DigitalOcean
    }

    fn cluster_name(&self) -> &str {
        &self.settings.cluster_name
    }

    async fn provision(&self) -> Result<KubernetesCluster, CloudProviderError> {
        self.ensure_authenticated()?;

        let cluster = match self.find_existing()? {
            Some(existing) => {
                info!(cluster = %existing.name, state = %existing.status.state, "Reusing existing DOKS cluster");
                existing
            }
            None => self.create()?,
        };

        let cluster = if cluster.cluster_status() == KubernetesClusterStatus::Running {
            cluster
        } else {
            self.wait_running(&cluster.id).await?
        };

        info!(cluster = %cluster.name, "DOKS cluster is running");
        Ok(Self::to_cluster(cluster))
    }

    async fn configure_kubeconfig(
        &self,
        cluster: &KubernetesCluster,
    ) -> Result<(), CloudProviderError> {
        self.doctl(["kubernetes", "cluster", "kubeconfig", "save", cluster.name.as_str()])?;
        info!(cluster = %cluster.name, "Kubeconfig updated");
        Ok(())
    }
}
