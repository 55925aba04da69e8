//! OpenGovernance installer library.
//!
//! Stands up a Kubernetes cluster on AWS, GCP or DigitalOcean, installs the
//! OpenGovernance Helm chart, and exposes it over HTTPS, HTTP, or a local
//! port-forward. Progress is saved after every step so an interrupted run
//! resumes where it stopped.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use og_cloud::{CloudProvider, SystemRunner};
//! use og_installer::{InstallConfig, InstallType, Installer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = InstallConfig::with_defaults(CloudProvider::DigitalOcean);
//!     config.install_type = InstallType::Minimal;
//!     let mut installer = Installer::new_or_resume(config, Arc::new(SystemRunner))?;
//!     installer.run_to_completion().await?;
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]
// Subcommand entry points are async for uniform dispatch
#![allow(clippy::unused_async)]
// Allow imports after statements in functions
#![allow(clippy::items_after_statements)]

pub mod commands;
pub mod config;
pub mod ingress_details;
pub mod logging;
pub mod orchestrator;
pub mod post_install;
pub mod prompt;
pub mod state;
pub mod ui;
pub mod validation;
pub mod validator;

// Re-export commonly used types at the crate root
pub use config::{InstallConfig, InstallType};
pub use ingress_details::IngressDetails;
pub use orchestrator::Installer;
pub use state::{InstallPlan, InstallState, InstallStep};
