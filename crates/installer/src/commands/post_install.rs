use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use og_cloud::tools;
use og_cloud::SystemRunner;

use crate::ingress_details::{self, IngressDetails};
use crate::post_install::{PostInstall, PostInstallOptions};
use crate::prompt::{DialoguerPrompter, NonInteractive, Prompter};
use crate::ui;
use crate::validator::PrerequisitesValidator;

/// Finish a domain install once DNS points at the load balancer
#[derive(Args, Debug)]
pub struct PostInstallCommand {
    /// Details file written by `og-install install`
    #[arg(long, value_name = "FILE", default_value = ingress_details::FILE_NAME)]
    pub details: PathBuf,

    /// AWS region for ACM
    #[arg(short, long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Never prompt
    #[arg(long = "silent-install")]
    pub silent: bool,

    /// Deployment restarted to pick up the domain
    #[arg(long, default_value = "nginx-proxy")]
    pub proxy_deployment: String,
}

impl PostInstallCommand {
    pub async fn run(&self) -> Result<()> {
        ui::print_section("OpenGovernance Post-Install");

        let details = IngressDetails::load(&self.details).with_context(|| {
            format!(
                "Run `og-install install` first; could not load {}",
                self.details.display()
            )
        })?;

        let mut requirements = vec![tools::KUBECTL, tools::HELM, tools::DIG];
        if details.provider.uses_acm() {
            requirements.push(tools::AWS_CLI);
        }
        let validator = PrerequisitesValidator::new(requirements);
        validator.validate()?;
        let has_dig = validator
            .check()
            .iter()
            .any(|c| c.requirement.name == tools::DIG.name && !c.is_missing());

        let prompter: Box<dyn Prompter> = if self.silent {
            Box::new(NonInteractive)
        } else {
            Box::new(DialoguerPrompter::default())
        };

        let options = PostInstallOptions {
            region: self.region.clone(),
            proxy_deployment: self.proxy_deployment.clone(),
            silent: self.silent,
            check_dns: has_dig,
            details_path: Some(self.details.clone()),
            ..PostInstallOptions::default()
        };

        let outcome = PostInstall::new(Arc::new(SystemRunner), details, options, prompter.as_ref())
            .run()
            .await?;

        println!();
        ui::print_success("OpenGovernance is ready");
        println!("  {} {}", "URL:".bold(), outcome.url.cyan());
        if outcome.certificate_obtained {
            if let Some(arn) = &outcome.certificate_arn {
                ui::print_kv("Certificate", arn);
            }
        }
        println!();
        Ok(())
    }
}
