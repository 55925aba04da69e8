//! AWS provider.
//!
//! The EKS cluster, VPC and node groups are declared in the Terraform root
//! module; this provider applies it and then talks to EKS through the `aws`
//! CLI for cluster details and kubeconfig.

mod client;
mod models;

pub use client::{resolve_aws_region, EksProvider};
pub use models::*;
