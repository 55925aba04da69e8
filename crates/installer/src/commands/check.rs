use anyhow::Result;
use clap::Args;
use og_cloud::CloudProvider;

use crate::config::{resolve_install_type, InstallConfig, InstallType};
use crate::ui;
use crate::validation::{validate_domain, validate_email};
use crate::validator::PrerequisitesValidator;

/// Check inputs and local tools without changing anything
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Cloud provider (aws, gcp, digitalocean)
    #[arg(value_name = "PROVIDER")]
    pub provider: CloudProvider,

    #[arg(short, long, env = "DOMAIN")]
    pub domain: Option<String>,

    #[arg(short, long, env = "EMAIL")]
    pub email: Option<String>,

    /// Installation type: 1/https, 2/http, 3/minimal
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub install_type: Option<InstallType>,

    #[arg(long = "skip-infra-setup")]
    pub skip_infra: bool,
}

impl CheckCommand {
    pub async fn run(&self) -> Result<()> {
        ui::print_section("Checking Prerequisites");

        if let Some(domain) = &self.domain {
            validate_domain(domain)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }

        // Same inference as a silent install.
        let install_type = resolve_install_type(
            self.install_type,
            true,
            self.provider,
            self.domain.as_deref(),
            self.email.as_deref(),
        )?
        .unwrap_or(InstallType::Minimal);

        let mut config = InstallConfig::with_defaults(self.provider);
        config.install_type = install_type;
        config.domain.clone_from(&self.domain);
        config.email.clone_from(&self.email);
        config.skip_infra = self.skip_infra;

        ui::print_kv("Provider", self.provider.display_name());
        ui::print_kv(
            "Type",
            &format!("{install_type} ({})", install_type.description()),
        );

        PrerequisitesValidator::for_config(&config).validate()?;
        ui::print_success("Ready to install");
        Ok(())
    }
}
