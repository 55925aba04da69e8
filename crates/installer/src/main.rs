//! OpenGovernance installer CLI.
//!
//! Provisions a managed Kubernetes cluster, installs the OpenGovernance chart,
//! and wires up ingress, TLS and DNS for the chosen installation type.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use og_installer::commands::check::CheckCommand;
use og_installer::commands::install::InstallCommand;
use og_installer::commands::post_install::PostInstallCommand;
use og_installer::commands::status::StatusCommand;
use og_installer::logging;

/// OpenGovernance - Kubernetes installer.
#[derive(Parser)]
#[command(
    name = "og-install",
    version,
    about = "OpenGovernance installer",
    long_about = "Install OpenGovernance on AWS, GCP or DigitalOcean.\n\n\
                  Provisions the cluster (or uses the current kubeconfig context),\n\
                  installs the Helm chart, and exposes it over HTTPS, HTTP or a\n\
                  local port-forward.\n\n\
                  Progress is saved to install-state.json; re-running the same\n\
                  command resumes from where it left off."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (also enabled by DEBUG_MODE=true).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Append logs to this file as well.
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[allow(clippy::large_enum_variant)] // Install is the primary command, boxing adds indirection
enum Commands {
    /// Install OpenGovernance.
    ///
    /// Provisions or reuses a cluster, installs the chart, and configures
    /// ingress and TLS for the selected installation type.
    Install(InstallCommand),

    /// Finish a domain install after DNS has been created.
    ///
    /// Verifies DNS, obtains the certificate where needed, and points the
    /// release at the domain.
    PostInstall(PostInstallCommand),

    /// Check inputs and required tools.
    Check(CheckCommand),

    /// Show saved installation progress.
    Status(StatusCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Install(cmd) => cmd.run().await,
        Commands::PostInstall(cmd) => cmd.run().await,
        Commands::Check(cmd) => cmd.run().await,
        Commands::Status(cmd) => cmd.run().await,
    }
}
