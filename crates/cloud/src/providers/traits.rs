//! Cluster provider trait and common types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exec::CommandError;
use crate::poll::{PollConfig, PollExhausted};
use crate::tools::{self, MissingTools, Requirement};

/// Errors that can occur while provisioning or connecting to a cluster.
#[derive(Error, Debug)]
pub enum CloudProviderError {
    /// A vendor CLI failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Terraform/OpenTofu is not installed.
    #[error(transparent)]
    MissingTools(#[from] MissingTools),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The cluster ended up in a failed state.
    #[error("Cluster {name} is in state {status}")]
    ClusterFailed {
        name: String,
        status: KubernetesClusterStatus,
    },

    /// Waiting for the cluster ran out of attempts.
    #[error(transparent)]
    Exhausted(#[from] PollExhausted),

    /// Infrastructure outputs could not be read.
    #[error("Infrastructure output error: {0}")]
    Output(String),
}

/// Kubernetes cluster status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KubernetesClusterStatus {
    /// Cluster is being created.
    Creating,
    /// Cluster is active and running.
    Running,
    /// Cluster is being updated.
    Updating,
    /// Cluster is being deleted.
    Deleting,
    /// Cluster is in an error state.
    Error,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for KubernetesClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Running => write!(f, "running"),
            Self::Updating => write!(f, "updating"),
            Self::Deleting => write!(f, "deleting"),
            Self::Error => write!(f, "error"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A managed Kubernetes cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesCluster {
    /// Cluster name.
    pub name: String,
    /// Region/location.
    pub region: String,
    /// Current status.
    pub status: KubernetesClusterStatus,
    /// API server endpoint.
    pub endpoint: Option<String>,
    /// Kubernetes version.
    pub version: Option<String>,
}

/// Supported clouds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Gcp,
    #[serde(alias = "do")]
    DigitalOcean,
}

impl CloudProvider {
    pub const ALL: [Self; 3] = [Self::Aws, Self::Gcp, Self::DigitalOcean];

    /// Whether TLS is terminated with an ACM certificate on an ALB.
    ///
    /// Every other provider uses ingress-nginx with cert-manager.
    #[must_use]
    pub fn uses_acm(self) -> bool {
        matches!(self, Self::Aws)
    }

    /// Human-readable name of the managed Kubernetes offering.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Aws => "AWS EKS",
            Self::Gcp => "GCP GKE",
            Self::DigitalOcean => "DigitalOcean Kubernetes",
        }
    }

    /// Region used when nothing else is configured.
    #[must_use]
    pub fn default_region(self) -> Option<&'static str> {
        match self {
            // Resolved from the AWS CLI profile.
            Self::Aws => None,
            Self::Gcp => Some("us-central1"),
            Self::DigitalOcean => Some("nyc3"),
        }
    }

    /// CLIs needed for an install.
    ///
    /// `dig` is always listed but never critical.
    #[must_use]
    pub fn requirements(self, skip_infra: bool, needs_acm: bool) -> Vec<Requirement> {
        let mut reqs = Vec::new();

        if skip_infra {
            if needs_acm {
                reqs.push(tools::AWS_CLI);
            }
        } else {
            match self {
                Self::Aws => reqs.extend([tools::AWS_CLI, tools::TERRAFORM]),
                Self::Gcp => reqs.extend([tools::GCLOUD, tools::TERRAFORM]),
                Self::DigitalOcean => reqs.push(tools::DOCTL),
            }
        }

        reqs.extend([tools::KUBECTL, tools::HELM, tools::DIG]);
        reqs
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => write!(f, "aws"),
            Self::Gcp => write!(f, "gcp"),
            Self::DigitalOcean => write!(f, "digitalocean"),
        }
    }
}

impl FromStr for CloudProvider {
    type Err = CloudProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" | "eks" => Ok(Self::Aws),
            "gcp" | "gke" | "google" => Ok(Self::Gcp),
            "digitalocean" | "do" | "doks" => Ok(Self::DigitalOcean),
            other => Err(CloudProviderError::Config(format!(
                "unknown provider '{other}' (expected aws, gcp or digitalocean)"
            ))),
        }
    }
}

/// Inputs shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub cluster_name: String,
    pub region: String,
    /// Terraform root module (EKS, GKE).
    pub infra_dir: PathBuf,
    /// `terraform` or `tofu`; detected on `PATH` when unset.
    pub terraform_binary: Option<String>,
    /// GCP project; read from `gcloud config` when unset.
    pub gcp_project: Option<String>,
    /// DOKS node pool size slug.
    pub node_size: String,
    /// DOKS node pool count.
    pub node_count: u32,
    /// Budget for a cluster to become ready (DOKS).
    pub cluster_poll: PollConfig,
}

impl ProviderSettings {
    #[must_use]
    pub fn new(cluster_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            region: region.into(),
            infra_dir: PathBuf::from("."),
            terraform_binary: None,
            gcp_project: None,
            node_size: "s-4vcpu-8gb".to_string(),
            node_count: 3,
            cluster_poll: PollConfig::fixed(60, 20),
        }
    }
}

/// Something that can hand back a reachable Kubernetes cluster.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Which cloud this is.
    fn kind(&self) -> CloudProvider;

    /// Name of the cluster being provisioned.
    fn cluster_name(&self) -> &str;

    /// CLIs this provider shells out to.
    fn requirements(&self) -> Vec<Requirement> {
        self.kind().requirements(false, self.kind().uses_acm())
    }

    /// Create the cluster, or adopt it if it already exists.
    async fn provision(&self) -> Result<KubernetesCluster, CloudProviderError>;

    /// Point the local kubeconfig at `cluster`.
    async fn configure_kubeconfig(
        &self,
        cluster: &KubernetesCluster,
    ) -> Result<(), CloudProviderError>;
}
