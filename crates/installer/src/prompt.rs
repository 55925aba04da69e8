//! Interactive input.
//!
//! The installer only asks for a handful of values. [`Prompter`] keeps those
//! questions behind a trait so silent runs and tests never touch a terminal.

use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use og_cloud::CloudProvider;

use crate::config::InstallType;
use crate::validation::{validate_domain, validate_email};

/// Source of answers for the questions the installer asks.
pub trait Prompter: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if no answer can be obtained.
    fn select_install_type(&self, provider: CloudProvider) -> Result<InstallType>;

    /// # Errors
    ///
    /// Returns an error if no answer can be obtained.
    fn input_domain(&self) -> Result<String>;

    /// # Errors
    ///
    /// Returns an error if no answer can be obtained.
    fn input_email(&self) -> Result<String>;

    /// # Errors
    ///
    /// Returns an error if no answer can be obtained.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
}

/// Terminal prompts.
#[derive(Default)]
pub struct DialoguerPrompter {
    theme: ColorfulTheme,
}

impl Prompter for DialoguerPrompter {
    fn select_install_type(&self, provider: CloudProvider) -> Result<InstallType> {
        let items: Vec<String> = InstallType::ALL
            .iter()
            .map(|t| match (t, provider.uses_acm()) {
                (InstallType::Https, true) => format!("{} (ACM certificate)", t.description()),
                (InstallType::Https, false) => format!("{} (Let's Encrypt)", t.description()),
                _ => t.description().to_string(),
            })
            .collect();

        let idx = Select::with_theme(&self.theme)
            .with_prompt("Select installation type")
            .default(0)
            .items(&items)
            .interact()?;

        Ok(InstallType::ALL[idx])
    }

    fn input_domain(&self) -> Result<String> {
        let domain: String = Input::with_theme(&self.theme)
            .with_prompt("Domain for OpenGovernance (e.g. demo.opengovernance.io)")
            .validate_with(|input: &String| validate_domain(input.trim()).map_err(|e| e.to_string()))
            .interact_text()?;
        Ok(domain.trim().to_string())
    }

    fn input_email(&self) -> Result<String> {
        let email: String = Input::with_theme(&self.theme)
            .with_prompt("Email for Let's Encrypt notifications")
            .validate_with(|input: &String| validate_email(input.trim()).map_err(|e| e.to_string()))
            .interact_text()?;
        Ok(email.trim().to_string())
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }
}

/// Answers nothing; used with `--silent-install`.
///
/// Confirmations take their default. Any question that needs real input
/// fails, since silent runs must supply it as flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn select_install_type(&self, _provider: CloudProvider) -> Result<InstallType> {
        bail!("Installation type is required in silent mode; pass -t")
    }

    fn input_domain(&self) -> Result<String> {
        bail!("A domain is required; pass -d/--domain")
    }

    fn input_email(&self) -> Result<String> {
        bail!("An email is required for Let's Encrypt; pass -e/--email")
    }

    fn confirm(&self, _prompt: &str, default: bool) -> Result<bool> {
        Ok(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{complete_inputs, InstallConfig};

    /// Fixed answers, for exercising prompt-driven paths.
    struct Scripted {
        install_type: InstallType,
    }

    impl Prompter for Scripted {
        fn select_install_type(&self, _provider: CloudProvider) -> Result<InstallType> {
            Ok(self.install_type)
        }

        fn input_domain(&self) -> Result<String> {
            Ok("prompted.opengovernance.io".into())
        }

        fn input_email(&self) -> Result<String> {
            Ok("ops@example.com".into())
        }

        fn confirm(&self, _prompt: &str, _default: bool) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_interactive_prompts_for_type_and_missing_inputs() {
        let mut config = InstallConfig::with_defaults(CloudProvider::Gcp);
        let prompter = Scripted {
            install_type: InstallType::Https,
        };

        complete_inputs(&mut config, None, &prompter).unwrap();

        assert_eq!(config.install_type, InstallType::Https);
        assert_eq!(config.domain.as_deref(), Some("prompted.opengovernance.io"));
        assert_eq!(config.email.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn test_given_domain_is_not_prompted_again() {
        let mut config = InstallConfig::with_defaults(CloudProvider::Aws);
        config.domain = Some("given.opengovernance.io".into());
        let prompter = Scripted {
            install_type: InstallType::Https,
        };

        complete_inputs(&mut config, Some(InstallType::Https), &prompter).unwrap();

        assert_eq!(config.domain.as_deref(), Some("given.opengovernance.io"));
        assert_eq!(config.email, None);
    }

    #[test]
    fn test_silent_inference_never_prompts() {
        let mut config = InstallConfig::with_defaults(CloudProvider::DigitalOcean);
        config.silent = true;

        complete_inputs(&mut config, None, &NonInteractive).unwrap();
        assert_eq!(config.install_type, InstallType::Minimal);
    }

    #[test]
    fn test_invalid_flag_value_rejected() {
        let mut config = InstallConfig::with_defaults(CloudProvider::Aws);
        config.silent = true;
        config.domain = Some("not a domain".into());

        let err = complete_inputs(&mut config, None, &NonInteractive).unwrap_err();
        assert!(err.to_string().contains("not a domain"));
    }

    #[test]
    fn test_non_interactive_confirm_takes_default() {
        assert!(NonInteractive.confirm("Continue?", true).unwrap());
        assert!(!NonInteractive.confirm("Continue?", false).unwrap());
    }
}
