//! Finish an install once the domain's DNS record exists.
//!
//! Runs from `ingress_details.env` alone, so it works in a fresh shell or on
//! another machine with the same kubeconfig.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use og_cloud::acm::{AcmClient, CertificateWorkflow};
use og_cloud::aws::resolve_aws_region;
use og_cloud::dns::DnsChecker;
use og_cloud::helm::{Helm, HelmRelease};
use og_cloud::kubectl::{Kubectl, LoadBalancerTarget};
use og_cloud::manifests::{self, IngressOptions, IngressTls};
use og_cloud::CommandRunner;
use tracing::info;

use crate::config::{InstallType, PollSettings};
use crate::ingress_details::IngressDetails;
use crate::prompt::Prompter;
use crate::ui;

/// Inputs that do not live in the details file.
#[derive(Debug, Clone)]
pub struct PostInstallOptions {
    /// AWS region; falls back to the CLI profile.
    pub region: Option<String>,
    /// Deployment restarted to pick up the new domain.
    pub proxy_deployment: String,
    /// Service and port the ingress routes to.
    pub proxy_service: String,
    pub proxy_port: u16,
    pub poll: PollSettings,
    pub silent: bool,
    /// Wait for DNS with `dig`; off when `dig` is not installed.
    pub check_dns: bool,
    /// Details file rewritten when a new certificate is obtained.
    pub details_path: Option<PathBuf>,
}

impl Default for PostInstallOptions {
    fn default() -> Self {
        Self {
            region: None,
            proxy_deployment: "nginx-proxy".to_string(),
            proxy_service: "nginx-proxy".to_string(),
            proxy_port: 80,
            poll: PollSettings::default(),
            silent: false,
            check_dns: true,
            details_path: None,
        }
    }
}

/// What post-install ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostInstallOutcome {
    pub url: String,
    pub certificate_arn: Option<String>,
    /// Whether a certificate was obtained here (the install ran without one).
    pub certificate_obtained: bool,
}

/// Post-install flow over the details of a finished install.
pub struct PostInstall<'a> {
    runner: Arc<dyn CommandRunner>,
    details: IngressDetails,
    options: PostInstallOptions,
    prompter: &'a dyn Prompter,
}

impl<'a> PostInstall<'a> {
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        details: IngressDetails,
        options: PostInstallOptions,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            runner,
            details,
            options,
            prompter,
        }
    }

    fn url(&self, domain: &str) -> String {
        match self.details.install_type {
            InstallType::Https => format!("https://{domain}"),
            _ => format!("http://{domain}"),
        }
    }

    /// Run every post-install step.
    ///
    /// # Errors
    ///
    /// Returns an error if DNS never resolves to the load balancer, the
    /// certificate cannot be issued, or a helm/kubectl call fails.
    pub async fn run(mut self) -> Result<PostInstallOutcome> {
        let domain = self
            .details
            .domain
            .clone()
            .context("No DOMAIN in ingress details; post-install only applies to domain installs")?;
        let target = LoadBalancerTarget::from_address(&self.details.lb_dns);

        if self.options.check_dns {
            self.wait_for_dns(&domain, &target).await?;
        } else {
            ui::print_warning("dig not found; skipping DNS verification");
            ui::print_dns_instructions(&domain, &target);
        }

        let mut certificate_obtained = false;
        if self.details.provider.uses_acm() && self.details.install_type == InstallType::Https {
            certificate_obtained = self.ensure_certificate(&domain).await?;
        }

        self.upgrade_release(&domain)?;

        let kubectl = Kubectl::new(Arc::clone(&self.runner));
        kubectl.rollout_restart(&self.details.namespace, &self.options.proxy_deployment)?;
        ui::print_success(&format!("Restarted {}", self.options.proxy_deployment));

        let url = self.url(&domain);
        info!(url = %url, "Post-install complete");
        Ok(PostInstallOutcome {
            url,
            certificate_arn: self.details.certificate_arn,
            certificate_obtained,
        })
    }

    async fn wait_for_dns(&self, domain: &str, target: &LoadBalancerTarget) -> Result<()> {
        ui::print_step(&format!("Checking that {domain} points at {target}"));
        let dns = DnsChecker::new(Arc::clone(&self.runner));
        if !dns.points_to(domain, target)? {
            ui::print_dns_instructions(domain, target);
        }

        let spinner = ui::spinner(&format!("Waiting for DNS of {domain} to propagate"));
        let result = dns.wait_for_dns(domain, target, &self.options.poll.dns()).await;
        spinner.finish_and_clear();
        result?;

        ui::print_success("DNS resolves to the load balancer");
        Ok(())
    }

    /// Make sure an issued ACM certificate backs the ALB.
    ///
    /// Returns whether a new certificate had to be attached.
    async fn ensure_certificate(&mut self, domain: &str) -> Result<bool> {
        let region = resolve_aws_region(self.runner.as_ref(), self.options.region.as_deref())?;
        let acm = AcmClient::new(Arc::clone(&self.runner), region);

        if let Some(arn) = &self.details.certificate_arn {
            ui::print_step("Verifying certificate status");
            acm.wait_for_issued(arn, &self.options.poll.cert_issue())
                .await?;
            ui::print_success("Certificate issued");
            return Ok(false);
        }

        ui::print_step(&format!("Obtaining an ACM certificate for {domain}"));
        let silent = self.options.silent;
        let prompter = self.prompter;
        let obtained = CertificateWorkflow::new(&acm)
            .with_record_poll(self.options.poll.cert_record())
            .with_issue_poll(self.options.poll.cert_issue())
            .obtain(domain, |_, record| {
                ui::print_certificate_record(domain, record);
                if !silent && !prompter.confirm("Have you created the validation record?", true)? {
                    anyhow::bail!("validation record for {domain} not confirmed");
                }
                Ok(())
            })
            .await?;

        let opts = IngressOptions {
            name: self.details.ingress_name.clone(),
            namespace: self.details.namespace.clone(),
            host: Some(domain.to_string()),
            service_name: self.options.proxy_service.clone(),
            service_port: i32::from(self.options.proxy_port),
            tls: IngressTls::AcmCertificate(obtained.arn.clone()),
        };
        let yaml = manifests::to_yaml(&manifests::alb_ingress(&opts))?;
        Kubectl::new(Arc::clone(&self.runner)).apply_manifest(&yaml)?;
        ui::print_success(&format!("Ingress {} now terminates TLS", opts.name));

        self.details.certificate_arn = Some(obtained.arn);
        if let Some(path) = &self.options.details_path {
            self.details.write(path)?;
            ui::print_success(&format!("Recorded the certificate in {}", path.display()));
        }
        Ok(true)
    }

    fn upgrade_release(&self, domain: &str) -> Result<()> {
        let release = HelmRelease::new(
            &self.details.helm_release,
            &self.details.helm_chart,
            &self.details.namespace,
        )
        .create_namespace(false)
        .reuse_values(true)
        .set("global.domain", domain)
        .set("dex.config.issuer", format!("{}/dex", self.url(domain)));

        Helm::new(Arc::clone(&self.runner)).upgrade_install(&release)?;
        ui::print_success(&format!("Release {} updated for {domain}", release.name));
        Ok(())
    }
}
