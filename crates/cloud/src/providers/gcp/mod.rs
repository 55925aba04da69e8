//! GCP provider.
//!
//! The GKE cluster is declared in Terraform; credentials are fetched with
//! `gcloud container clusters get-credentials`.

mod client;

pub use client::{GkeCluster, GkeProvider};
