//! Installation state persistence.
//!
//! Progress is written to `install-state.json` after every step so an
//! interrupted install resumes where it stopped instead of re-requesting
//! certificates or re-applying infrastructure.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use og_cloud::kubectl::LoadBalancerTarget;
use og_cloud::{CloudProvider, KubernetesCluster};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{InstallConfig, InstallType};

/// Installation steps, in execution order.
///
/// Not every install runs every step; see [`InstallPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStep {
    /// Not yet started.
    NotStarted,
    /// Checking CLI tools.
    ValidatingPrerequisites,

    // Cluster
    /// Terraform apply (EKS, GKE) or `doctl` create (DOKS).
    ProvisioningCluster,
    /// Writing the kubeconfig context.
    ConfiguringKubeconfig,

    // Certificates (AWS HTTPS)
    /// Requesting or reusing an ACM certificate.
    RequestingCertificate,
    /// Waiting for ACM to issue it.
    AwaitingCertificate,

    // Application
    /// `helm upgrade --install` of the OpenGovernance chart.
    InstallingChart,
    /// Waiting for every pod in the namespace.
    WaitingForPods,

    // Ingress
    /// ingress-nginx (GKE, DOKS).
    InstallingIngressController,
    /// cert-manager and the Let's Encrypt issuer (GKE, DOKS HTTPS).
    InstallingCertManager,
    /// Applying the application ingress.
    ConfiguringIngress,
    /// Waiting for the load balancer address.
    WaitingForLoadBalancer,
    /// Writing `ingress_details.env`.
    WritingIngressDetails,

    // Minimal
    /// Starting `kubectl port-forward`.
    StartingPortForward,

    /// Installation complete.
    Complete,
}

impl InstallStep {
    /// Get a human-readable description of the step.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::ValidatingPrerequisites => "Validating prerequisites",
            Self::ProvisioningCluster => "Provisioning Kubernetes cluster",
            Self::ConfiguringKubeconfig => "Configuring kubeconfig",
            Self::RequestingCertificate => "Requesting ACM certificate",
            Self::AwaitingCertificate => "Waiting for certificate issuance",
            Self::InstallingChart => "Installing OpenGovernance Helm chart",
            Self::WaitingForPods => "Waiting for pods to be ready",
            Self::InstallingIngressController => "Installing ingress-nginx",
            Self::InstallingCertManager => "Installing cert-manager",
            Self::ConfiguringIngress => "Configuring ingress",
            Self::WaitingForLoadBalancer => "Waiting for load balancer",
            Self::WritingIngressDetails => "Saving ingress details",
            Self::StartingPortForward => "Starting port-forward",
            Self::Complete => "Complete",
        }
    }

    /// Whether the step runs a bounded poll.
    ///
    /// These steps are never retried as a whole: a rerun would start a fresh
    /// attempt budget.
    #[must_use]
    pub fn polls(self) -> bool {
        matches!(
            self,
            Self::ProvisioningCluster
                | Self::RequestingCertificate
                | Self::AwaitingCertificate
                | Self::WaitingForPods
                | Self::WaitingForLoadBalancer
        )
    }
}

impl std::fmt::Display for InstallStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// The ordered steps one install runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    steps: Vec<InstallStep>,
}

impl InstallPlan {
    /// Steps for `config`'s provider and install type.
    #[must_use]
    pub fn for_config(config: &InstallConfig) -> Self {
        use InstallStep as S;

        let aws = config.provider == CloudProvider::Aws;
        let exposed = config.install_type != InstallType::Minimal;
        let https = config.install_type == InstallType::Https;

        let mut steps = vec![S::ValidatingPrerequisites];
        if !config.skip_infra {
            steps.extend([S::ProvisioningCluster, S::ConfiguringKubeconfig]);
        }
        // The ALB needs the certificate ARN before the ingress exists.
        if config.needs_acm() {
            steps.extend([S::RequestingCertificate, S::AwaitingCertificate]);
        }
        steps.extend([S::InstallingChart, S::WaitingForPods]);
        if exposed && !aws {
            steps.push(S::InstallingIngressController);
            if https {
                steps.push(S::InstallingCertManager);
            }
        }
        if exposed {
            steps.extend([
                S::ConfiguringIngress,
                S::WaitingForLoadBalancer,
                S::WritingIngressDetails,
            ]);
        } else {
            steps.push(S::StartingPortForward);
        }
        steps.push(S::Complete);

        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[InstallStep] {
        &self.steps
    }

    /// Total number of steps, excluding `Complete`.
    #[must_use]
    pub fn total(&self) -> usize {
        self.steps.len() - 1
    }

    /// 1-based position of `step` for progress display.
    #[must_use]
    pub fn step_number(&self, step: InstallStep) -> usize {
        self.steps.iter().position(|s| *s == step).map_or(0, |i| i + 1)
    }

    /// The step that follows `step`.
    ///
    /// Steps this plan skips resolve to the next planned step after them.
    #[must_use]
    pub fn next_after(&self, step: InstallStep) -> InstallStep {
        self.steps
            .iter()
            .copied()
            .find(|s| *s > step)
            .unwrap_or(InstallStep::Complete)
    }
}

/// Full installation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallState {
    /// Installation configuration.
    pub config: InstallConfig,
    /// Current installation step.
    pub step: InstallStep,
    /// Cluster reported by the provider.
    #[serde(default)]
    pub cluster: Option<KubernetesCluster>,
    /// Context every kubectl call is pinned to.
    #[serde(default)]
    pub kube_context: Option<String>,
    /// ACM certificate ARN (AWS HTTPS).
    #[serde(default)]
    pub certificate_arn: Option<String>,
    /// Load balancer hostname or IP.
    #[serde(default)]
    pub lb_address: Option<String>,
    /// PID of the background port-forward.
    #[serde(default)]
    pub port_forward_pid: Option<u32>,
    /// Timestamp of last state update.
    pub updated_at: String,
    /// Number of retry attempts for current step.
    pub attempt_count: u32,
    /// Last error message (if any).
    pub last_error: Option<String>,
}

impl InstallState {
    /// Create a new installation state.
    #[must_use]
    pub fn new(config: InstallConfig) -> Self {
        Self {
            config,
            step: InstallStep::NotStarted,
            cluster: None,
            kube_context: None,
            certificate_arn: None,
            lb_address: None,
            port_forward_pid: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
            attempt_count: 0,
            last_error: None,
        }
    }

    /// Load state from file if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(output_dir: &Path) -> Result<Option<Self>> {
        let path = output_dir.join("install-state.json");
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).context("Failed to read state file")?;
        let state: Self = serde_json::from_str(&content).context("Failed to parse state file")?;

        info!(
            "Loaded installation state: step={:?}, attempt={}",
            state.step, state.attempt_count
        );
        Ok(Some(state))
    }

    /// Save state to file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&mut self) -> Result<()> {
        self.updated_at = chrono::Utc::now().to_rfc3339();

        std::fs::create_dir_all(&self.config.output_dir)
            .context("Failed to create output directory")?;

        let content = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        std::fs::write(self.config.state_file(), content).context("Failed to write state file")?;

        Ok(())
    }

    /// Update the current step and save.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub fn set_step(&mut self, step: InstallStep) -> Result<()> {
        info!("Step: {} -> {}", self.step, step);
        self.step = step;
        self.attempt_count = 0;
        self.last_error = None;
        self.save()
    }

    /// Advance to the next step of `plan`.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub fn advance(&mut self, plan: &InstallPlan) -> Result<()> {
        let next = plan.next_after(self.step);
        self.set_step(next)
    }

    /// Record an error for the current step.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub fn record_error(&mut self, error: &str) -> Result<()> {
        self.last_error = Some(error.to_string());
        self.attempt_count += 1;
        self.save()
    }

    /// Clear the last error.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub fn clear_error(&mut self) -> Result<()> {
        self.last_error = None;
        self.save()
    }

    /// Load balancer address as a typed target.
    #[must_use]
    pub fn lb_target(&self) -> Option<LoadBalancerTarget> {
        self.lb_address
            .as_deref()
            .map(LoadBalancerTarget::from_address)
    }

    /// Check if the installation is complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.step == InstallStep::Complete
    }

    /// Check if we can resume from this state.
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.step != InstallStep::NotStarted && self.step != InstallStep::Complete
    }
}

/// Retry configuration for operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.min(10)).unwrap_or(10);
        let multiplier = self.backoff_multiplier.powi(exp);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry given the current attempt count.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: CloudProvider, install_type: InstallType) -> InstallConfig {
        let mut config = InstallConfig::with_defaults(provider);
        config.install_type = install_type;
        config.domain = Some("demo.opengovernance.io".into());
        config
    }

    #[test]
    fn test_polling_steps() {
        assert!(InstallStep::AwaitingCertificate.polls());
        assert!(InstallStep::WaitingForLoadBalancer.polls());
        assert!(!InstallStep::InstallingChart.polls());
        assert!(!InstallStep::ConfiguringIngress.polls());
    }

    #[test]
    fn test_aws_https_plan_gets_certificate_before_chart() {
        let plan = InstallPlan::for_config(&config(CloudProvider::Aws, InstallType::Https));
        let steps = plan.steps();

        let cert = steps
            .iter()
            .position(|s| *s == InstallStep::AwaitingCertificate)
            .unwrap();
        let chart = steps
            .iter()
            .position(|s| *s == InstallStep::InstallingChart)
            .unwrap();
        assert!(cert < chart);
        assert!(!steps.contains(&InstallStep::InstallingIngressController));
        assert!(!steps.contains(&InstallStep::StartingPortForward));
    }

    #[test]
    fn test_do_https_plan_uses_cert_manager() {
        let plan = InstallPlan::for_config(&config(CloudProvider::DigitalOcean, InstallType::Https));
        assert!(plan.steps().contains(&InstallStep::InstallingIngressController));
        assert!(plan.steps().contains(&InstallStep::InstallingCertManager));
        assert!(!plan.steps().contains(&InstallStep::RequestingCertificate));
    }

    #[test]
    fn test_http_plan_has_no_certificates() {
        let plan = InstallPlan::for_config(&config(CloudProvider::Gcp, InstallType::Http));
        assert!(plan.steps().contains(&InstallStep::InstallingIngressController));
        assert!(!plan.steps().contains(&InstallStep::InstallingCertManager));
    }

    #[test]
    fn test_minimal_skip_infra_plan() {
        let mut cfg = config(CloudProvider::DigitalOcean, InstallType::Minimal);
        cfg.skip_infra = true;
        let plan = InstallPlan::for_config(&cfg);

        assert_eq!(
            plan.steps(),
            &[
                InstallStep::ValidatingPrerequisites,
                InstallStep::InstallingChart,
                InstallStep::WaitingForPods,
                InstallStep::StartingPortForward,
                InstallStep::Complete,
            ]
        );
        assert_eq!(plan.total(), 4);
        assert_eq!(plan.step_number(InstallStep::WaitingForPods), 3);
    }

    #[test]
    fn test_next_after_skips_unplanned_steps() {
        let mut cfg = config(CloudProvider::Aws, InstallType::Http);
        cfg.skip_infra = true;
        let plan = InstallPlan::for_config(&cfg);

        assert_eq!(
            plan.next_after(InstallStep::NotStarted),
            InstallStep::ValidatingPrerequisites
        );
        assert_eq!(
            plan.next_after(InstallStep::ValidatingPrerequisites),
            InstallStep::InstallingChart
        );
        assert_eq!(plan.next_after(InstallStep::Complete), InstallStep::Complete);
    }

    #[test]
    fn test_state_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(CloudProvider::Aws, InstallType::Https);
        cfg.output_dir = dir.path().to_path_buf();

        let mut state = InstallState::new(cfg);
        state.certificate_arn = Some("arn:aws:acm:us-east-1:1:certificate/abc".into());
        state.set_step(InstallStep::AwaitingCertificate).unwrap();
        state.record_error("throttled").unwrap();

        let loaded = InstallState::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.step, InstallStep::AwaitingCertificate);
        assert_eq!(loaded.attempt_count, 1);
        assert_eq!(loaded.last_error.as_deref(), Some("throttled"));
        assert_eq!(
            loaded.certificate_arn.as_deref(),
            Some("arn:aws:acm:us-east-1:1:certificate/abc")
        );
        assert!(loaded.can_resume());
    }

    #[test]
    fn test_missing_state_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InstallState::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_retry_config() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(20));

        let huge_delay = config.delay_for_attempt(100);
        assert!(huge_delay <= config.max_delay);
    }

    #[test]
    fn test_should_retry() {
        let config = RetryConfig::default();
        assert!(config.should_retry(0));
        assert!(config.should_retry(9));
        assert!(!config.should_retry(10));
    }
}
