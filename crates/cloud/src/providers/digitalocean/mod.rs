//! DigitalOcean provider.
//!
//! DOKS clusters are created with `doctl` directly, no Terraform involved.

mod client;
mod models;

pub use client::DoksProvider;
pub use models::*;
