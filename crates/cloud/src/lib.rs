//! Cloud and Kubernetes plumbing for the OpenGovernance installer.
//!
//! Every external system is reached through its vendor CLI:
//!
//! - **AWS** - `aws` for ACM certificates and EKS kubeconfig, Terraform for infrastructure
//! - **GCP** - `gcloud` for GKE credentials, Terraform for infrastructure
//! - **DigitalOcean** - `doctl` for DOKS clusters
//! - **Kubernetes** - `kubectl` and `helm`
//! - **DNS** - `dig`
//!
//! [`exec::CommandRunner`] is the single seam between this crate and those
//! processes, and [`poll::poll_until`] is the single bounded polling loop used
//! for certificates, load balancers, pods, DNS and cluster creation.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use og_cloud::acm::{AcmClient, CertificateWorkflow};
//! use og_cloud::exec::SystemRunner;
//! use og_cloud::poll::PollConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = AcmClient::new(Arc::new(SystemRunner), "us-east-1");
//!     let workflow = CertificateWorkflow::new(&client)
//!         .with_issue_poll(PollConfig::fixed(60, 30));
//!
//!     let cert = workflow
//!         .obtain("demo.opengovernance.io", |_, record| {
//!             println!("Create CNAME {} -> {}", record.name, record.value);
//!             Ok(())
//!         })
//!         .await?;
//!
//!     println!("Certificate ready: {}", cert.arn);
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acm;
pub mod dns;
pub mod exec;
pub mod helm;
pub mod kubectl;
pub mod manifests;
pub mod poll;
pub mod providers;
pub mod terraform;
pub mod tools;

pub use exec::{CommandError, CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use poll::{poll_until, PollConfig, PollExhausted, Probe};
pub use providers::{
    aws, cluster_provider, digitalocean, gcp, CloudProvider, CloudProviderError, ClusterProvider,
    KubernetesCluster, KubernetesClusterStatus, ProviderSettings,
};
