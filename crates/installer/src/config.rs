//! Installation configuration types.
//!
//! Values come from three layers: built-in defaults, an optional YAML file,
//! and command-line flags (highest precedence). The install type is then
//! settled by [`resolve_install_type`] and [`complete_inputs`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use og_cloud::{CloudProvider, PollConfig, ProviderSettings};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompt::Prompter;
use crate::validation::{validate_domain, validate_email};

/// Ingress class used with cert-manager.
pub const NGINX_INGRESS_CLASS: &str = "nginx";

/// `ClusterIssuer` created for Let's Encrypt.
pub const CLUSTER_ISSUER: &str = "letsencrypt-prod";

/// What the install exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstallType {
    /// Public domain with TLS.
    #[default]
    Https,
    /// Public domain, plain HTTP.
    Http,
    /// No ingress; reached through `kubectl port-forward`.
    Minimal,
}

impl InstallType {
    pub const ALL: [Self; 3] = [Self::Https, Self::Http, Self::Minimal];

    /// Number accepted by `-t`.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Https => 1,
            Self::Http => 2,
            Self::Minimal => 3,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Https => "Install with HTTPS and a custom domain",
            Self::Http => "Install with HTTP and a custom domain",
            Self::Minimal => "Minimal install, access through port-forward",
        }
    }

    #[must_use]
    pub fn needs_domain(self) -> bool {
        !matches!(self, Self::Minimal)
    }

    /// Inputs this type needs on `provider` that are absent.
    #[must_use]
    pub fn missing_inputs(
        self,
        provider: CloudProvider,
        domain: Option<&str>,
        email: Option<&str>,
    ) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.needs_domain() && domain.is_none() {
            missing.push("domain");
        }
        // ACM validates over DNS; Let's Encrypt needs a contact address.
        if self == Self::Https && !provider.uses_acm() && email.is_none() {
            missing.push("email");
        }
        missing
    }
}

impl std::fmt::Display for InstallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Https => write!(f, "https"),
            Self::Http => write!(f, "http"),
            Self::Minimal => write!(f, "minimal"),
        }
    }
}

impl std::str::FromStr for InstallType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "https" => Ok(Self::Https),
            "2" | "http" => Ok(Self::Http),
            "3" | "minimal" => Ok(Self::Minimal),
            other => Err(ConfigError::InvalidInstallType(other.to_string())),
        }
    }
}

/// Configuration errors surfaced to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown installation type '{0}'. Supported: 1 (https), 2 (http), 3 (minimal)")]
    InvalidInstallType(String),

    #[error("Installation type '{install_type}' requires {}; pass them as flags when using --silent-install", .missing.join(" and "))]
    MissingInputs {
        install_type: InstallType,
        missing: Vec<&'static str>,
    },
}

/// Attempt budgets and intervals for every wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Checks while waiting for an ACM certificate to be issued.
    pub cert_check_count: u32,
    pub cert_check_interval_secs: u64,
    /// Checks while waiting for ACM to publish the validation record.
    pub cert_record_check_count: u32,
    pub cert_record_interval_secs: u64,
    pub lb_check_count: u32,
    pub lb_check_interval_secs: u64,
    pub pod_check_count: u32,
    pub pod_check_interval_secs: u64,
    pub dns_check_count: u32,
    pub dns_check_interval_secs: u64,
    pub cluster_check_count: u32,
    pub cluster_check_interval_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            cert_check_count: og_cloud::acm::CHECK_COUNT_CERT,
            cert_check_interval_secs: og_cloud::acm::CERT_CHECK_INTERVAL_SECS,
            cert_record_check_count: 20,
            cert_record_interval_secs: 5,
            lb_check_count: 30,
            lb_check_interval_secs: 10,
            pod_check_count: 60,
            pod_check_interval_secs: 10,
            dns_check_count: 30,
            dns_check_interval_secs: 20,
            cluster_check_count: 60,
            cluster_check_interval_secs: 20,
        }
    }
}

impl PollSettings {
    /// Same budgets, no sleeping. Used by tests.
    #[must_use]
    pub fn immediate(self) -> Self {
        Self {
            cert_check_interval_secs: 0,
            cert_record_interval_secs: 0,
            lb_check_interval_secs: 0,
            pod_check_interval_secs: 0,
            dns_check_interval_secs: 0,
            cluster_check_interval_secs: 0,
            ..self
        }
    }

    #[must_use]
    pub fn cert_issue(&self) -> PollConfig {
        PollConfig::fixed(self.cert_check_count, self.cert_check_interval_secs)
    }

    #[must_use]
    pub fn cert_record(&self) -> PollConfig {
        PollConfig::fixed(self.cert_record_check_count, self.cert_record_interval_secs)
    }

    #[must_use]
    pub fn load_balancer(&self) -> PollConfig {
        PollConfig::fixed(self.lb_check_count, self.lb_check_interval_secs)
    }

    #[must_use]
    pub fn pods(&self) -> PollConfig {
        PollConfig::fixed(self.pod_check_count, self.pod_check_interval_secs)
    }

    #[must_use]
    pub fn dns(&self) -> PollConfig {
        PollConfig::fixed(self.dns_check_count, self.dns_check_interval_secs)
    }

    #[must_use]
    pub fn cluster(&self) -> PollConfig {
        PollConfig::fixed(self.cluster_check_count, self.cluster_check_interval_secs)
    }
}

/// Full installation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    // Target
    /// Cloud to install on.
    pub provider: CloudProvider,
    /// What gets exposed.
    pub install_type: InstallType,
    /// Public domain (HTTPS/HTTP installs).
    pub domain: Option<String>,
    /// Let's Encrypt contact (cert-manager HTTPS installs).
    pub email: Option<String>,

    // Cluster
    /// Region; empty until resolved for AWS.
    pub region: String,
    pub cluster_name: String,
    /// Reuse the current kubeconfig context instead of provisioning.
    pub skip_infra: bool,
    /// Terraform root module (AWS, GCP).
    pub infra_dir: PathBuf,
    pub gcp_project: Option<String>,
    /// DOKS node size slug.
    pub node_size: String,
    pub node_count: u32,

    // Helm
    pub namespace: String,
    pub release: String,
    pub chart: String,
    pub chart_repo_name: String,
    pub chart_repo_url: String,
    pub chart_version: Option<String>,
    /// Extra values file passed with `-f`.
    pub values_file: Option<PathBuf>,

    // Ingress
    pub ingress_name: String,
    /// Service the ingress routes to.
    pub proxy_service: String,
    pub proxy_port: u16,
    /// Local port for minimal installs.
    pub port_forward_port: u16,

    // Behaviour
    /// Never prompt.
    pub silent: bool,
    /// Directory for `install-state.json` and `ingress_details.env`.
    pub output_dir: PathBuf,
    pub poll: PollSettings,
}

impl InstallConfig {
    /// Create config with the defaults the install scripts hard-code.
    #[must_use]
    pub fn with_defaults(provider: CloudProvider) -> Self {
        Self {
            provider,
            install_type: InstallType::default(),
            domain: None,
            email: None,
            region: provider.default_region().unwrap_or_default().to_string(),
            cluster_name: "opengovernance".into(),
            skip_infra: false,
            infra_dir: PathBuf::from("infra").join(provider.to_string()),
            gcp_project: None,
            node_size: "s-4vcpu-8gb".into(),
            node_count: 3,
            namespace: "opengovernance".into(),
            release: "opengovernance".into(),
            chart: "opengovernance/opengovernance".into(),
            chart_repo_name: "opengovernance".into(),
            chart_repo_url: "https://opengovernance.github.io/charts".into(),
            chart_version: None,
            values_file: None,
            ingress_name: "opengovernance-ingress".into(),
            proxy_service: "nginx-proxy".into(),
            proxy_port: 80,
            port_forward_port: 8080,
            silent: false,
            output_dir: PathBuf::from("."),
            poll: PollSettings::default(),
        }
    }

    /// Get the state file path.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.output_dir.join("install-state.json")
    }

    /// Get the ingress details path.
    #[must_use]
    pub fn ingress_details_path(&self) -> PathBuf {
        self.output_dir.join(crate::ingress_details::FILE_NAME)
    }

    /// Secret cert-manager stores the Let's Encrypt certificate in.
    #[must_use]
    pub fn tls_secret_name(&self) -> String {
        format!("{}-tls", self.release)
    }

    /// Whether an ACM certificate is part of this install.
    #[must_use]
    pub fn needs_acm(&self) -> bool {
        self.provider.uses_acm() && self.install_type == InstallType::Https
    }

    /// Where the application will be reachable once DNS is in place.
    #[must_use]
    pub fn app_url(&self) -> String {
        match (self.install_type, self.domain.as_deref()) {
            (InstallType::Https, Some(domain)) => format!("https://{domain}"),
            (InstallType::Http, Some(domain)) => format!("http://{domain}"),
            _ => format!("http://localhost:{}", self.port_forward_port),
        }
    }

    /// Settings handed to the cluster provider.
    #[must_use]
    pub fn provider_settings(&self) -> ProviderSettings {
        let mut settings = ProviderSettings::new(&self.cluster_name, &self.region);
        settings.infra_dir.clone_from(&self.infra_dir);
        settings.gcp_project.clone_from(&self.gcp_project);
        settings.node_size.clone_from(&self.node_size);
        settings.node_count = self.node_count;
        settings.cluster_poll = self.poll.cluster();
        settings
    }
}

/// `--config` file: every field optional, merged over the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub provider: Option<CloudProvider>,
    pub install_type: Option<InstallType>,
    pub domain: Option<String>,
    pub email: Option<String>,
    pub region: Option<String>,
    pub cluster_name: Option<String>,
    pub skip_infra: Option<bool>,
    pub infra_dir: Option<PathBuf>,
    pub gcp_project: Option<String>,
    pub node_size: Option<String>,
    pub node_count: Option<u32>,
    pub namespace: Option<String>,
    pub release: Option<String>,
    pub chart: Option<String>,
    pub chart_version: Option<String>,
    pub values_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub poll: Option<PollSettings>,
}

impl ConfigFile {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overwrite `config` with every value set in the file.
    pub fn apply(self, config: &mut InstallConfig) {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field { config.$field = value; })*
            };
        }
        macro_rules! merge_opt {
            ($($field:ident),*) => {
                $(if self.$field.is_some() { config.$field = self.$field; })*
            };
        }

        merge!(
            provider,
            install_type,
            region,
            cluster_name,
            skip_infra,
            infra_dir,
            node_size,
            node_count,
            namespace,
            release,
            chart,
            output_dir,
            poll
        );
        merge_opt!(domain, email, gcp_project, chart_version, values_file);
    }
}

/// Decide the install type without prompting.
///
/// * an explicit `-t` always wins; in silent mode its inputs must be present
/// * silent mode without `-t` infers `https` when the domain and the
///   provider's TLS inputs are present, `http` with only a domain, and
///   `minimal` otherwise
/// * interactive mode without `-t` returns `None` so the caller prompts
///
/// # Errors
///
/// Returns [`ConfigError::MissingInputs`] for an explicit type in silent mode
/// whose inputs are missing.
pub fn resolve_install_type(
    explicit: Option<InstallType>,
    silent: bool,
    provider: CloudProvider,
    domain: Option<&str>,
    email: Option<&str>,
) -> Result<Option<InstallType>, ConfigError> {
    if let Some(install_type) = explicit {
        let missing = install_type.missing_inputs(provider, domain, email);
        if silent && !missing.is_empty() {
            return Err(ConfigError::MissingInputs {
                install_type,
                missing,
            });
        }
        return Ok(Some(install_type));
    }

    if !silent {
        return Ok(None);
    }

    let inferred = [InstallType::Https, InstallType::Http]
        .into_iter()
        .find(|t| t.missing_inputs(provider, domain, email).is_empty())
        .unwrap_or(InstallType::Minimal);
    Ok(Some(inferred))
}

/// Settle the install type and fill in missing domain/email.
///
/// # Errors
///
/// Returns an error when inputs are invalid or missing in silent mode, or
/// when prompting fails.
pub fn complete_inputs(
    config: &mut InstallConfig,
    explicit: Option<InstallType>,
    prompter: &dyn Prompter,
) -> Result<()> {
    if let Some(domain) = &config.domain {
        validate_domain(domain)?;
    }
    if let Some(email) = &config.email {
        validate_email(email)?;
    }

    let resolved = resolve_install_type(
        explicit,
        config.silent,
        config.provider,
        config.domain.as_deref(),
        config.email.as_deref(),
    )?;

    config.install_type = match resolved {
        Some(install_type) => install_type,
        None => prompter.select_install_type(config.provider)?,
    };

    for input in config.install_type.missing_inputs(
        config.provider,
        config.domain.as_deref(),
        config.email.as_deref(),
    ) {
        match input {
            "domain" => config.domain = Some(prompter.input_domain()?),
            "email" => config.email = Some(prompter.input_email()?),
            _ => {}
        }
    }

    Ok(())
}
