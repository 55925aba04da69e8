use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use og_cloud::tools::{self, Requirement, ToolCheck};

use crate::config::InstallConfig;
use crate::ui;

/// Resolves a binary name to a path.
pub type ToolLookup = fn(&str) -> Option<PathBuf>;

/// Validates prerequisites for an OpenGovernance installation
pub struct PrerequisitesValidator {
    requirements: Vec<Requirement>,
    lookup: ToolLookup,
}

impl PrerequisitesValidator {
    /// Requirements for `config`'s provider and install type.
    #[must_use]
    pub fn for_config(config: &InstallConfig) -> Self {
        Self::new(
            config
                .provider
                .requirements(config.skip_infra, config.needs_acm()),
        )
    }

    #[must_use]
    pub fn new(requirements: Vec<Requirement>) -> Self {
        Self {
            requirements,
            lookup: tools::which_lookup,
        }
    }

    /// Replace the `PATH` lookup.
    #[must_use]
    pub fn with_lookup(mut self, lookup: ToolLookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Probe every requirement without printing.
    #[must_use]
    pub fn check(&self) -> Vec<ToolCheck> {
        tools::probe(&self.requirements, self.lookup)
    }

    /// Probe, print a report, and fail on missing critical tools.
    ///
    /// # Errors
    ///
    /// Returns an error naming every missing critical tool.
    pub fn validate(&self) -> Result<()> {
        println!();
        let checks = self.check();

        for check in &checks {
            let detail = check
                .found
                .as_ref()
                .map(|tool| tool.path.display().to_string());
            ui::print_check_result(check.requirement.name, !check.is_missing(), detail.as_deref());
        }

        println!();

        let failures: Vec<&ToolCheck> = checks.iter().filter(|c| c.is_missing()).collect();
        if failures.is_empty() {
            ui::print_success("All prerequisites met!");
            return Ok(());
        }

        ui::print_warning("Some prerequisites are not met:");
        println!();
        for failure in &failures {
            let req = &failure.requirement;
            if req.critical {
                println!(
                    "  {} {} - {}",
                    "✗".red(),
                    req.name.red(),
                    req.install_hint.bright_black()
                );
            } else {
                println!(
                    "  {} {} - {}",
                    "⚠".yellow(),
                    req.name.yellow(),
                    req.install_hint.bright_black()
                );
            }
        }
        println!();

        tools::ensure_available(&checks)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use og_cloud::CloudProvider;

    use super::*;
    use crate::config::InstallType;

    fn no_dig(binary: &str) -> Option<PathBuf> {
        (binary != "dig").then(|| PathBuf::from("/usr/bin").join(binary))
    }

    fn nothing(_: &str) -> Option<PathBuf> {
        None
    }

    #[test]
    fn test_missing_dig_is_only_a_warning() {
        let config = InstallConfig::with_defaults(CloudProvider::DigitalOcean);
        let validator = PrerequisitesValidator::for_config(&config).with_lookup(no_dig);
        assert!(validator.validate().is_ok());
    }

    #[test]
    fn test_missing_tools_fail_validation() {
        let config = InstallConfig::with_defaults(CloudProvider::Aws);
        let err = PrerequisitesValidator::for_config(&config)
            .with_lookup(nothing)
            .validate()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("aws"));
        assert!(msg.contains("terraform/tofu"));
        assert!(!msg.contains("dig"));
    }

    #[test]
    fn test_skip_infra_http_on_aws_needs_no_cloud_cli() {
        let mut config = InstallConfig::with_defaults(CloudProvider::Aws);
        config.skip_infra = true;
        config.install_type = InstallType::Http;

        let names: Vec<&str> = PrerequisitesValidator::for_config(&config)
            .check()
            .iter()
            .map(|c| c.requirement.name)
            .collect();
        assert_eq!(names, vec!["kubectl", "helm", "dig"]);
    }
}
