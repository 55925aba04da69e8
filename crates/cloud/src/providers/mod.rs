//! Cluster providers.
//!
//! EKS and GKE are declared in Terraform and applied here; DOKS is created
//! directly with `doctl`. Every provider ends by writing a kubeconfig
//! context so the rest of the install only talks to `kubectl` and `helm`.

pub mod aws;
pub mod digitalocean;
pub mod gcp;
mod traits;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use traits::{
    CloudProvider, CloudProviderError, ClusterProvider, KubernetesCluster,
    KubernetesClusterStatus, ProviderSettings,
};

pub use aws::EksProvider;
pub use digitalocean::DoksProvider;
pub use gcp::GkeProvider;

use crate::exec::CommandRunner;
use crate::terraform::{Terraform, TerraformOutput};

/// Build the provider for `kind`.
#[must_use]
pub fn cluster_provider(
    kind: CloudProvider,
    runner: Arc<dyn CommandRunner>,
    settings: ProviderSettings,
) -> Box<dyn ClusterProvider> {
    match kind {
        CloudProvider::Aws => Box::new(EksProvider::new(runner, settings)),
        CloudProvider::Gcp => Box::new(GkeProvider::new(runner, settings)),
        CloudProvider::DigitalOcean => Box::new(DoksProvider::new(runner, settings)),
    }
}

fn terraform_for(
    runner: &Arc<dyn CommandRunner>,
    settings: &ProviderSettings,
) -> Result<Terraform, CloudProviderError> {
    match &settings.terraform_binary {
        Some(binary) => Ok(Terraform::new(
            Arc::clone(runner),
            binary.as_str(),
            settings.infra_dir.clone(),
        )),
        None => Ok(Terraform::detect(
            Arc::clone(runner),
            settings.infra_dir.clone(),
        )?),
    }
}

/// `init`, `apply`, then read the outputs.
fn apply_infrastructure(
    terraform: &Terraform,
    vars: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, TerraformOutput>, CloudProviderError> {
    terraform.init()?;
    terraform.apply(vars)?;
    terraform
        .outputs()
        .map_err(|e| CloudProviderError::Output(e.to_string()))
}
