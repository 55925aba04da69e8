use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use og_cloud::{CloudProvider, SystemRunner};

use crate::config::{complete_inputs, ConfigFile, InstallConfig, InstallType};
use crate::orchestrator::Installer;
use crate::prompt::{DialoguerPrompter, NonInteractive, Prompter};
use crate::ui;
use crate::validation::validate_cluster_name;

/// Install OpenGovernance on a Kubernetes cluster
#[derive(Args, Debug, Default)]
pub struct InstallCommand {
    /// Cloud provider (aws, gcp, digitalocean)
    #[arg(value_name = "PROVIDER")]
    pub provider: Option<CloudProvider>,

    /// Domain OpenGovernance is served on
    #[arg(short, long, env = "DOMAIN")]
    pub domain: Option<String>,

    /// Contact email for Let's Encrypt
    #[arg(short, long, env = "EMAIL")]
    pub email: Option<String>,

    /// Installation type: 1/https, 2/http, 3/minimal
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub install_type: Option<InstallType>,

    /// Never prompt; infer the installation type from the given inputs
    #[arg(long = "silent-install")]
    pub silent: bool,

    /// Use the current kubeconfig context instead of provisioning a cluster
    #[arg(long = "skip-infra-setup")]
    pub skip_infra: bool,

    /// Cloud region (AWS also reads AWS_REGION)
    #[arg(short, long)]
    pub region: Option<String>,

    /// Kubernetes cluster name
    #[arg(long)]
    pub cluster_name: Option<String>,

    /// Terraform/OpenTofu root module
    #[arg(long, value_name = "DIR")]
    pub infra_dir: Option<PathBuf>,

    /// Directory for install-state.json and ingress_details.env
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Kubernetes namespace for the release
    #[arg(long)]
    pub namespace: Option<String>,

    /// Chart version to install
    #[arg(long)]
    pub chart_version: Option<String>,

    /// Extra Helm values file
    #[arg(long, value_name = "FILE")]
    pub values: Option<PathBuf>,

    /// GCP project (defaults to the active gcloud project)
    #[arg(long)]
    pub gcp_project: Option<String>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Discard saved progress and start over
    #[arg(long)]
    pub fresh: bool,
}

impl InstallCommand {
    /// Merge defaults, the config file, and flags.
    ///
    /// Returns the config and the install type chosen explicitly, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is invalid or no provider is given.
    pub fn build_config(&self) -> Result<(InstallConfig, Option<InstallType>)> {
        let file = self
            .config
            .as_deref()
            .map(ConfigFile::load)
            .transpose()?
            .unwrap_or_default();

        let Some(provider) = self.provider.or(file.provider) else {
            bail!("A provider is required: og-install install <aws|gcp|digitalocean>");
        };

        let explicit_type = self.install_type.or(file.install_type);

        let mut config = InstallConfig::with_defaults(provider);
        file.apply(&mut config);
        // A provider given on the command line wins over the file's.
        config.provider = provider;

        macro_rules! flag {
            ($($field:ident => $target:ident),*) => {
                $(if let Some(value) = &self.$field { config.$target = value.clone(); })*
            };
        }
        macro_rules! flag_opt {
            ($($field:ident => $target:ident),*) => {
                $(if self.$field.is_some() { config.$target.clone_from(&self.$field); })*
            };
        }

        if let Some(region) = self.region.clone().or_else(|| env_region(provider)) {
            config.region = region;
        }
        flag!(
            cluster_name => cluster_name,
            infra_dir => infra_dir,
            output_dir => output_dir,
            namespace => namespace
        );
        flag_opt!(
            domain => domain,
            email => email,
            chart_version => chart_version,
            values => values_file,
            gcp_project => gcp_project
        );
        config.silent |= self.silent;
        config.skip_infra |= self.skip_infra;

        Ok((config, explicit_type))
    }

    pub async fn run(&self) -> Result<()> {
        ui::print_banner();

        let (mut config, explicit_type) = self.build_config()?;
        validate_cluster_name(&config.cluster_name)?;

        let prompter: Box<dyn Prompter> = if config.silent {
            Box::new(NonInteractive)
        } else {
            Box::new(DialoguerPrompter::default())
        };
        complete_inputs(&mut config, explicit_type, prompter.as_ref())?;

        if self.fresh {
            let state_file = config.state_file();
            if state_file.exists() {
                std::fs::remove_file(&state_file)
                    .with_context(|| format!("Failed to remove {}", state_file.display()))?;
                ui::print_info("Discarded saved installation progress");
            }
        }

        print_config_summary(&config);

        if !config.silent && !prompter.confirm("Proceed with installation?", true)? {
            println!("{}", "Installation cancelled.".yellow());
            return Ok(());
        }

        let mut installer = Installer::new_or_resume(config, Arc::new(SystemRunner))?
            .with_prompter(prompter);
        installer.run_to_completion().await
    }
}

/// `AWS_REGION` only speaks for AWS; other providers keep their defaults.
fn env_region(provider: CloudProvider) -> Option<String> {
    if provider != CloudProvider::Aws {
        return None;
    }
    std::env::var("AWS_REGION")
        .ok()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

fn print_config_summary(config: &InstallConfig) {
    ui::print_section("Installation Summary");
    ui::print_kv("Provider", config.provider.display_name());
    ui::print_kv("Type", &format!("{} ({})", config.install_type, config.install_type.description()));
    if let Some(domain) = &config.domain {
        ui::print_kv("Domain", domain);
    }
    if let Some(email) = &config.email {
        ui::print_kv("Email", email);
    }
    if config.skip_infra {
        ui::print_kv("Cluster", "current kubeconfig context");
    } else {
        ui::print_kv("Cluster", &config.cluster_name);
        if !config.region.is_empty() {
            ui::print_kv("Region", &config.region);
        }
    }
    ui::print_kv("Namespace", &config.namespace);
    ui::print_kv("Chart", &config.chart);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("og.yaml");
        std::fs::write(
            &path,
            "provider: gcp\ndomain: file.opengovernance.io\nnamespace: from-file\ninstall_type: http\n",
        )
        .unwrap();

        let cmd = InstallCommand {
            provider: Some(CloudProvider::DigitalOcean),
            domain: Some("flag.opengovernance.io".into()),
            config: Some(path),
            ..InstallCommand::default()
        };
        let (config, explicit) = cmd.build_config().unwrap();

        assert_eq!(config.provider, CloudProvider::DigitalOcean);
        assert_eq!(config.domain.as_deref(), Some("flag.opengovernance.io"));
        assert_eq!(config.namespace, "from-file");
        assert_eq!(explicit, Some(InstallType::Http));
    }

    #[test]
    #[serial]
    fn test_provider_from_file() {
        std::env::remove_var("AWS_REGION");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("og.yaml");
        std::fs::write(&path, "provider: aws\nregion: eu-west-1\n").unwrap();

        let cmd = InstallCommand {
            config: Some(path),
            ..InstallCommand::default()
        };
        let (config, explicit) = cmd.build_config().unwrap();
        assert_eq!(config.provider, CloudProvider::Aws);
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(explicit, None);
    }

    #[test]
    #[serial]
    fn test_aws_region_env_only_applies_to_aws() {
        std::env::set_var("AWS_REGION", "eu-central-1");

        let digitalocean = InstallCommand {
            provider: Some(CloudProvider::DigitalOcean),
            ..InstallCommand::default()
        };
        let (config, _) = digitalocean.build_config().unwrap();
        assert_eq!(config.region, "nyc3");

        let aws = InstallCommand {
            provider: Some(CloudProvider::Aws),
            ..InstallCommand::default()
        };
        let (config, _) = aws.build_config().unwrap();
        assert_eq!(config.region, "eu-central-1");

        let flagged = InstallCommand {
            provider: Some(CloudProvider::Aws),
            region: Some("us-west-2".into()),
            ..InstallCommand::default()
        };
        let (config, _) = flagged.build_config().unwrap();
        assert_eq!(config.region, "us-west-2");

        std::env::remove_var("AWS_REGION");
    }

    #[test]
    fn test_provider_required() {
        let err = InstallCommand::default().build_config().unwrap_err();
        assert!(err.to_string().contains("provider is required"));
    }
}
