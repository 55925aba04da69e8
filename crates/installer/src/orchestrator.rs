//! Installer orchestration module.
//!
//! This module provides the main installation logic, coordinating:
//! - Cluster provisioning through the provider CLIs
//! - ACM certificate issuance on AWS
//! - The OpenGovernance Helm release
//! - Ingress, TLS and load-balancer discovery

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use og_cloud::acm::{AcmClient, CertificateError, CertificateStatus};
use og_cloud::aws::resolve_aws_region;
use og_cloud::helm::{Helm, HelmRelease};
use og_cloud::kubectl::Kubectl;
use og_cloud::manifests::{self, IngressOptions, IngressTls};
use og_cloud::tools::MissingTools;
use og_cloud::{
    cluster_provider, CloudProvider, CloudProviderError, ClusterProvider, CommandRunner,
    PollExhausted,
};
use tracing::{error, info, warn};

use crate::config::{ConfigError, InstallConfig, InstallType, CLUSTER_ISSUER, NGINX_INGRESS_CLASS};
use crate::ingress_details::{IngressDetails, IngressDetailsError};
use crate::prompt::{NonInteractive, Prompter};
use crate::state::{InstallPlan, InstallState, InstallStep, RetryConfig};
use crate::ui;
use crate::validation::ValidationError;
use crate::validator::{PrerequisitesValidator, ToolLookup};

/// ingress-nginx chart and the service its load balancer hangs off.
const INGRESS_NGINX_REPO: (&str, &str) = ("ingress-nginx", "https://kubernetes.github.io/ingress-nginx");
const INGRESS_NGINX_NAMESPACE: &str = "ingress-nginx";
const INGRESS_NGINX_SERVICE: &str = "ingress-nginx-controller";

const JETSTACK_REPO: (&str, &str) = ("jetstack", "https://charts.jetstack.io");
const CERT_MANAGER_NAMESPACE: &str = "cert-manager";

/// Passed to `helm --timeout` for the add-on charts.
const ADDON_TIMEOUT: &str = "10m";

/// Main installer struct that orchestrates the full installation process.
pub struct Installer {
    /// Installation state (persisted across runs).
    state: InstallState,
    /// Steps this install runs.
    plan: InstallPlan,
    /// Retry configuration for transient errors.
    retry_config: RetryConfig,
    runner: Arc<dyn CommandRunner>,
    /// Built on first use, once the region is known.
    provider: Option<Box<dyn ClusterProvider>>,
    prompter: Box<dyn Prompter>,
    tool_lookup: ToolLookup,
}

impl Installer {
    /// Create a new installer or resume from existing state.
    ///
    /// If state exists in the output directory, it will be loaded and the
    /// installation will resume from where it left off with the saved
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if state loading fails.
    pub fn new_or_resume(config: InstallConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        std::fs::create_dir_all(&config.output_dir).context("Failed to create output directory")?;

        let state = match InstallState::load(&config.output_dir)? {
            Some(existing) if existing.can_resume() => {
                ui::print_info(&format!("Resuming installation from: {}", existing.step));
                ui::print_info("Using the saved configuration; pass --fresh to start over.");
                if let Some(ref err) = existing.last_error {
                    ui::print_warning(&format!("Previous error: {err}"));
                }
                existing
            }
            Some(existing) if existing.is_complete() => {
                ui::print_success("Installation already complete!");
                existing
            }
            _ => InstallState::new(config),
        };

        Ok(Self {
            plan: InstallPlan::for_config(&state.config),
            state,
            retry_config: RetryConfig::default(),
            runner,
            provider: None,
            prompter: Box::new(NonInteractive),
            tool_lookup: og_cloud::tools::which_lookup,
        })
    }

    /// Use `provider` instead of the one matching the configuration.
    #[must_use]
    pub fn with_provider(mut self, provider: Box<dyn ClusterProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Replace the `PATH` lookup used for prerequisite checks.
    #[must_use]
    pub fn with_tool_lookup(mut self, lookup: ToolLookup) -> Self {
        self.tool_lookup = lookup;
        self
    }

    #[must_use]
    pub fn state(&self) -> &InstallState {
        &self.state
    }

    #[must_use]
    pub fn plan(&self) -> &InstallPlan {
        &self.plan
    }

    /// Run installation to completion with automatic retry/resume.
    ///
    /// This method will:
    /// 1. Execute each planned step in sequence
    /// 2. Automatically retry transient failures with exponential backoff
    /// 3. Save state after each step for recovery
    /// 4. Print progress updates throughout
    ///
    /// # Errors
    ///
    /// Returns an error if installation fails after all retries.
    pub async fn run_to_completion(&mut self) -> Result<()> {
        if self.state.is_complete() {
            self.print_success_summary();
            return Ok(());
        }

        if self.state.step == InstallStep::NotStarted {
            self.state.advance(&self.plan)?;
        }

        ui::print_section("Starting Installation");
        self.print_progress();

        loop {
            match self.execute_current_step().await {
                Ok(()) => {
                    self.state.clear_error()?;

                    if self.state.is_complete() {
                        self.print_success_summary();
                        return Ok(());
                    }

                    self.state.advance(&self.plan)?;
                    if !self.state.is_complete() {
                        self.print_progress();
                    }
                }
                Err(e) => {
                    self.state.record_error(&format!("{e:#}"))?;

                    if !self.state.step.polls()
                        && Self::is_transient_error(&e)
                        && self.retry_config.should_retry(self.state.attempt_count)
                    {
                        let delay = self
                            .retry_config
                            .delay_for_attempt(self.state.attempt_count);
                        warn!(
                            attempt = self.state.attempt_count,
                            error = %e,
                            delay_secs = delay.as_secs(),
                            "Transient error, retrying"
                        );
                        ui::print_warning(&format!(
                            "Transient error (attempt {}): {e:#}",
                            self.state.attempt_count
                        ));
                        ui::print_info(&format!("Retrying in {} seconds...", delay.as_secs()));
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // Hard failure - state is saved, can be resumed later
                    error!(
                        step = ?self.state.step,
                        error = %e,
                        "Installation failed"
                    );
                    ui::print_error(&format!(
                        "Installation failed at step '{}': {e:#}",
                        self.state.step
                    ));
                    ui::print_info("State has been saved. Re-run the same command to resume.");
                    return Err(e);
                }
            }
        }
    }

    fn print_progress(&self) {
        ui::print_progress_step(
            self.plan.step_number(self.state.step),
            self.plan.total(),
            self.state.step.description(),
        );
    }

    /// Execute the current step.
    async fn execute_current_step(&mut self) -> Result<()> {
        info!(step = ?self.state.step, "Executing step");

        match self.state.step {
            InstallStep::NotStarted | InstallStep::Complete => {}
            InstallStep::ValidatingPrerequisites => self.validate_prerequisites()?,
            InstallStep::ProvisioningCluster => self.provision_cluster().await?,
            InstallStep::ConfiguringKubeconfig => self.configure_kubeconfig().await?,
            InstallStep::RequestingCertificate => self.request_certificate().await?,
            InstallStep::AwaitingCertificate => self.await_certificate().await?,
            InstallStep::InstallingChart => self.install_chart()?,
            InstallStep::WaitingForPods => self.wait_for_pods().await?,
            InstallStep::InstallingIngressController => self.install_ingress_controller()?,
            InstallStep::InstallingCertManager => self.install_cert_manager()?,
            InstallStep::ConfiguringIngress => self.configure_ingress()?,
            InstallStep::WaitingForLoadBalancer => self.wait_for_load_balancer().await?,
            InstallStep::WritingIngressDetails => self.write_ingress_details()?,
            InstallStep::StartingPortForward => self.start_port_forward()?,
        }

        Ok(())
    }

    fn config(&self) -> &InstallConfig {
        &self.state.config
    }

    fn kubectl(&self) -> Kubectl {
        let kubectl = Kubectl::new(Arc::clone(&self.runner));
        match &self.state.kube_context {
            Some(ctx) => kubectl.with_context(ctx.as_str()),
            None => kubectl,
        }
    }

    fn helm(&self) -> Helm {
        Helm::new(Arc::clone(&self.runner))
    }

    fn acm(&self) -> AcmClient {
        AcmClient::new(Arc::clone(&self.runner), self.config().region.as_str())
    }

    fn provider(&mut self) -> &dyn ClusterProvider {
        let config = &self.state.config;
        let runner = &self.runner;
        let provider = self.provider.get_or_insert_with(|| {
            cluster_provider(config.provider, Arc::clone(runner), config.provider_settings())
        });
        &**provider
    }

    // =========================================================================
    // Prerequisites
    // =========================================================================

    fn validate_prerequisites(&mut self) -> Result<()> {
        PrerequisitesValidator::for_config(self.config())
            .with_lookup(self.tool_lookup)
            .validate()?;

        let config = self.config();
        if config.provider == CloudProvider::Aws && (!config.skip_infra || config.needs_acm()) {
            let explicit = Some(config.region.as_str()).filter(|r| !r.is_empty());
            let region = resolve_aws_region(self.runner.as_ref(), explicit)?;
            self.state.config.region = region;
        }

        if self.config().skip_infra {
            let kubectl = Kubectl::new(Arc::clone(&self.runner));
            let context = kubectl
                .current_context()
                .context("No current kubeconfig context; configure kubectl or drop --skip-infra-setup")?;
            if !kubectl.with_context(context.as_str()).cluster_reachable() {
                bail!("Kubernetes cluster for context '{context}' is not reachable");
            }
            ui::print_success(&format!("Using existing cluster context: {context}"));
            self.state.kube_context = Some(context);
        }

        self.state.save()
    }

    // =========================================================================
    // Cluster
    // =========================================================================

    async fn provision_cluster(&mut self) -> Result<()> {
        let spinner = ui::spinner(&format!(
            "Provisioning {} cluster {}",
            self.config().provider.display_name(),
            self.config().cluster_name
        ));
        let result = self.provider().provision().await;
        spinner.finish_and_clear();

        let cluster = result?;
        ui::print_success(&format!(
            "Cluster {} is {} ({})",
            cluster.name, cluster.status, cluster.region
        ));
        self.state.cluster = Some(cluster);
        self.state.save()
    }

    async fn configure_kubeconfig(&mut self) -> Result<()> {
        let cluster = self
            .state
            .cluster
            .clone()
            .context("No cluster recorded; provisioning did not complete")?;

        self.provider().configure_kubeconfig(&cluster).await?;

        let context = Kubectl::new(Arc::clone(&self.runner)).current_context()?;
        ui::print_success(&format!("kubectl context set to {context}"));
        self.state.kube_context = Some(context);
        self.state.save()
    }

    // =========================================================================
    // Certificates
    // =========================================================================

    fn require_domain(&self) -> Result<String> {
        self.config()
            .domain
            .clone()
            .with_context(|| format!("A domain is required for a {} install", self.config().install_type))
    }

    async fn request_certificate(&mut self) -> Result<()> {
        let domain = self.require_domain()?;
        let acm = self.acm();

        let arn = match self.state.certificate_arn.clone() {
            Some(arn) => arn,
            None => {
                let arn = match acm.find_reusable(&domain)? {
                    Some(arn) => {
                        ui::print_info(&format!("Reusing ACM certificate {arn}"));
                        arn
                    }
                    None => acm.request(&domain)?,
                };
                self.state.certificate_arn = Some(arn.clone());
                self.state.save()?;
                arn
            }
        };

        let detail = acm
            .wait_for_validation_record(&arn, &self.config().poll.cert_record())
            .await?;

        if detail.status == CertificateStatus::Issued {
            ui::print_success("Certificate is already issued");
            return Ok(());
        }

        let Some(record) = &detail.validation_record else {
            warn!(arn = %arn, "No validation record published");
            return Ok(());
        };

        ui::print_certificate_record(&domain, record);
        if self.config().silent {
            ui::print_info("Create the record above; waiting for ACM to validate it.");
        } else if !self
            .prompter
            .confirm("Have you created the validation record?", true)?
        {
            return Err(CertificateError::Aborted(anyhow::anyhow!(
                "validation record for {domain} not confirmed"
            ))
            .into());
        }
        Ok(())
    }

    async fn await_certificate(&mut self) -> Result<()> {
        let arn = self
            .state
            .certificate_arn
            .clone()
            .context("No certificate ARN recorded")?;

        let poll = self.config().poll.cert_issue();
        let spinner = ui::spinner(&format!(
            "Waiting for ACM to issue the certificate (up to {} checks)",
            poll.max_attempts
        ));
        let result = self.acm().wait_for_issued(&arn, &poll).await;
        spinner.finish_and_clear();

        result?;
        ui::print_success("Certificate issued");
        Ok(())
    }

    // =========================================================================
    // Application
    // =========================================================================

    fn chart_release(&self) -> HelmRelease {
        let config = self.config();
        let mut release = HelmRelease::new(&config.release, &config.chart, &config.namespace);
        if let Some(version) = &config.chart_version {
            release = release.version(version.as_str());
        }
        if let Some(values) = &config.values_file {
            release = release.values_file(values.clone());
        }
        if let Some(domain) = config.domain.as_deref().filter(|_| config.install_type.needs_domain()) {
            release = release
                .set("global.domain", domain)
                .set("dex.config.issuer", format!("{}/dex", config.app_url()));
        }
        release
    }

    fn install_chart(&mut self) -> Result<()> {
        let config = self.config();
        let helm = self.helm();
        helm.repo_add(&config.chart_repo_name, &config.chart_repo_url)?;
        helm.repo_update()?;
        helm.upgrade_install(&self.chart_release())?;

        ui::print_success(&format!(
            "Helm release {} installed in namespace {}",
            config.release, config.namespace
        ));
        Ok(())
    }

    async fn wait_for_pods(&mut self) -> Result<()> {
        let kubectl = self.kubectl();
        let namespace = self.config().namespace.clone();
        let poll = self.config().poll.pods();

        let readiness = kubectl
            .wait_for_pods_ready(&namespace, &poll, |r| ui::print_pod_progress(r.ready, r.total))
            .await
            .inspect_err(|_| println!())?;

        ui::print_success(&format!("All pods ready ({readiness})"));
        Ok(())
    }

    // =========================================================================
    // Ingress
    // =========================================================================

    fn install_ingress_controller(&mut self) -> Result<()> {
        let helm = self.helm();
        let (repo, url) = INGRESS_NGINX_REPO;
        helm.repo_add(repo, url)?;
        helm.repo_update()?;
        helm.upgrade_install(
            &HelmRelease::new(repo, "ingress-nginx/ingress-nginx", INGRESS_NGINX_NAMESPACE)
                .wait(ADDON_TIMEOUT),
        )?;
        ui::print_success("ingress-nginx installed");
        Ok(())
    }

    fn install_cert_manager(&mut self) -> Result<()> {
        let email = self
            .config()
            .email
            .clone()
            .context("An email is required for Let's Encrypt")?;

        let helm = self.helm();
        let (repo, url) = JETSTACK_REPO;
        helm.repo_add(repo, url)?;
        helm.repo_update()?;
        helm.upgrade_install(
            &HelmRelease::new("cert-manager", "jetstack/cert-manager", CERT_MANAGER_NAMESPACE)
                .set("crds.enabled", "true")
                .wait(ADDON_TIMEOUT),
        )?;

        let issuer =
            manifests::letsencrypt_cluster_issuer(CLUSTER_ISSUER, &email, NGINX_INGRESS_CLASS);
        self.kubectl().apply_manifest(&manifests::to_yaml(&issuer)?)?;

        ui::print_success(&format!("cert-manager installed with ClusterIssuer {CLUSTER_ISSUER}"));
        Ok(())
    }

    fn configure_ingress(&mut self) -> Result<()> {
        let config = self.config();
        let https = config.install_type == InstallType::Https;

        let tls = match (config.provider.uses_acm(), https) {
            (true, true) => IngressTls::AcmCertificate(
                self.state
                    .certificate_arn
                    .clone()
                    .context("No certificate ARN recorded")?,
            ),
            (false, true) => IngressTls::CertManager {
                issuer: CLUSTER_ISSUER.to_string(),
                secret_name: config.tls_secret_name(),
            },
            (_, false) => IngressTls::None,
        };

        let opts = IngressOptions {
            name: config.ingress_name.clone(),
            namespace: config.namespace.clone(),
            host: config.domain.clone(),
            service_name: config.proxy_service.clone(),
            service_port: i32::from(config.proxy_port),
            tls,
        };
        let ingress = if config.provider.uses_acm() {
            manifests::alb_ingress(&opts)
        } else {
            manifests::nginx_ingress(&opts)
        };

        self.kubectl().apply_manifest(&manifests::to_yaml(&ingress)?)?;
        ui::print_success(&format!("Ingress {} applied", opts.name));
        Ok(())
    }

    async fn wait_for_load_balancer(&mut self) -> Result<()> {
        let kubectl = self.kubectl();
        let config = self.config();
        let poll = config.poll.load_balancer();

        let spinner = ui::spinner("Waiting for the load balancer address");
        let result = if config.provider.uses_acm() {
            kubectl
                .wait_for_ingress_address(&config.namespace, &config.ingress_name, &poll)
                .await
        } else {
            kubectl
                .wait_for_service_address(INGRESS_NGINX_NAMESPACE, INGRESS_NGINX_SERVICE, &poll)
                .await
        };
        spinner.finish_and_clear();

        let target = result?;
        ui::print_success(&format!("Load balancer ready: {target}"));
        self.state.lb_address = Some(target.to_string());
        self.state.save()
    }

    fn write_ingress_details(&mut self) -> Result<()> {
        let lb = self
            .state
            .lb_address
            .clone()
            .context("No load balancer address recorded")?;
        let details =
            IngressDetails::from_config(self.config(), self.state.certificate_arn.clone(), lb);
        let path = self.config().ingress_details_path();
        details.write(&path)?;
        ui::print_success(&format!("Ingress details saved to {}", path.display()));
        Ok(())
    }

    fn start_port_forward(&mut self) -> Result<()> {
        let config = self.config();
        let target = format!("svc/{}", config.proxy_service);
        let pid = self.kubectl().port_forward(
            &config.namespace,
            &target,
            config.port_forward_port,
            config.proxy_port,
        )?;
        self.state.port_forward_pid = Some(pid);
        self.state.save()
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Whether a failed step is worth retrying.
    ///
    /// Exhausted polling budgets and terminal states are final even when
    /// their message mentions a timeout.
    #[must_use]
    pub fn is_transient_error(error: &anyhow::Error) -> bool {
        let permanent = error.chain().any(|cause| {
            cause.is::<PollExhausted>()
                || cause.is::<MissingTools>()
                || cause.is::<ValidationError>()
                || cause.is::<ConfigError>()
                || cause.is::<IngressDetailsError>()
                || matches!(
                    cause.downcast_ref::<CertificateError>(),
                    Some(
                        CertificateError::Terminal { .. }
                            | CertificateError::Exhausted(_)
                            | CertificateError::Aborted(_)
                    )
                )
                || matches!(
                    cause.downcast_ref::<CloudProviderError>(),
                    Some(
                        CloudProviderError::Exhausted(_)
                            | CloudProviderError::ClusterFailed { .. }
                            | CloudProviderError::Config(_)
                            | CloudProviderError::MissingTools(_)
                    )
                )
        });
        if permanent {
            return false;
        }

        let msg = format!("{error:#}").to_lowercase();
        msg.contains("timeout")
            || msg.contains("timed out")
            || msg.contains("connection refused")
            || msg.contains("connection reset")
            || msg.contains("rate limit")
            || msg.contains("throttl")
            || msg.contains("503")
            || msg.contains("502")
            || msg.contains("504")
            || msg.contains("temporarily unavailable")
            || msg.contains("try again")
            || msg.contains("network is unreachable")
    }

    /// Print success summary at the end.
    fn print_success_summary(&self) {
        let config = self.config();
        ui::print_section("Installation Complete!");
        ui::print_success("OpenGovernance is installed.");

        ui::print_kv("Provider", config.provider.display_name());
        if let Some(ref context) = self.state.kube_context {
            ui::print_kv("Context", context);
        }
        ui::print_kv("Namespace", &config.namespace);
        ui::print_kv("Release", &config.release);
        if let Some(ref arn) = self.state.certificate_arn {
            ui::print_kv("Certificate", arn);
        }

        let mut next = Vec::new();
        match (config.domain.as_deref(), self.state.lb_target()) {
            (Some(domain), Some(target)) if config.install_type.needs_domain() => {
                ui::print_kv("Load balancer", target.as_str());
                ui::print_dns_instructions(domain, &target);
                next.push(format!(
                    "Create the {} record for {domain} shown above",
                    target.record_type()
                ));
                next.push("Run `og-install post-install` to finish once DNS resolves".to_string());
                next.push(format!("Open {}", config.app_url()));
            }
            _ => {
                if let Some(pid) = self.state.port_forward_pid {
                    ui::print_kv("Port-forward PID", &pid.to_string());
                }
                next.push(format!(
                    "Open {} (port-forward keeps running in the background)",
                    config.app_url()
                ));
                next.push(format!(
                    "If it stops, run: kubectl port-forward -n {} svc/{} {}:{}",
                    config.namespace, config.proxy_service, config.port_forward_port, config.proxy_port
                ));
            }
        }
        ui::print_next_steps(&next);
    }
}
