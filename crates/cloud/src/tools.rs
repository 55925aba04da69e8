//! Required CLI tool discovery.

use std::path::PathBuf;

use thiserror::Error;

/// A CLI the installer shells out to.
///
/// The requirement is met when any of `candidates` resolves on `PATH`, which
/// is how `terraform` and `tofu` are treated as interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    /// Display name.
    pub name: &'static str,
    /// Binaries that satisfy the requirement, in order of preference.
    pub candidates: &'static [&'static str],
    /// Where to get it.
    pub install_hint: &'static str,
    /// Missing critical tools abort the install.
    pub critical: bool,
}

pub const AWS_CLI: Requirement = Requirement {
    name: "aws",
    candidates: &["aws"],
    install_hint: "Install the AWS CLI from https://aws.amazon.com/cli/",
    critical: true,
};

pub const GCLOUD: Requirement = Requirement {
    name: "gcloud",
    candidates: &["gcloud"],
    install_hint: "Install the Google Cloud SDK from https://cloud.google.com/sdk/docs/install",
    critical: true,
};

pub const DOCTL: Requirement = Requirement {
    name: "doctl",
    candidates: &["doctl"],
    install_hint: "Install doctl from https://docs.digitalocean.com/reference/doctl/how-to/install/",
    critical: true,
};

pub const KUBECTL: Requirement = Requirement {
    name: "kubectl",
    candidates: &["kubectl"],
    install_hint: "Install kubectl from https://kubernetes.io/docs/tasks/tools/",
    critical: true,
};

pub const HELM: Requirement = Requirement {
    name: "helm",
    candidates: &["helm"],
    install_hint: "Install Helm from https://helm.sh/docs/intro/install/",
    critical: true,
};

pub const TERRAFORM: Requirement = Requirement {
    name: "terraform/tofu",
    candidates: &["terraform", "tofu"],
    install_hint: "Install Terraform (https://developer.hashicorp.com/terraform/install) or OpenTofu (https://opentofu.org/docs/intro/install/)",
    critical: true,
};

pub const DIG: Requirement = Requirement {
    name: "dig",
    candidates: &["dig"],
    install_hint: "Install dig (bind-utils / dnsutils) to verify DNS records",
    critical: false,
};

/// A requirement resolved to a concrete binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub name: &'static str,
    pub binary: &'static str,
    pub path: PathBuf,
}

/// Result of looking up one requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCheck {
    pub requirement: Requirement,
    pub found: Option<ResolvedTool>,
}

impl ToolCheck {
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.found.is_none()
    }
}

/// One or more critical tools are absent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Required tools not found on PATH: {}", .missing.join(", "))]
pub struct MissingTools {
    pub missing: Vec<String>,
}

/// Resolve a binary through `PATH`.
#[must_use]
pub fn which_lookup(binary: &str) -> Option<PathBuf> {
    which::which(binary).ok()
}

/// Look up every requirement with `lookup`.
pub fn probe<F>(requirements: &[Requirement], lookup: F) -> Vec<ToolCheck>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    requirements
        .iter()
        .map(|req| {
            let found = req.candidates.iter().find_map(|&binary| {
                lookup(binary).map(|path| ResolvedTool {
                    name: req.name,
                    binary,
                    path,
                })
            });
            ToolCheck {
                requirement: *req,
                found,
            }
        })
        .collect()
}

/// Fail if any critical requirement is missing.
///
/// # Errors
///
/// Returns [`MissingTools`] naming every missing critical tool.
pub fn ensure_available(checks: &[ToolCheck]) -> Result<(), MissingTools> {
    let missing: Vec<String> = checks
        .iter()
        .filter(|c| c.is_missing() && c.requirement.critical)
        .map(|c| c.requirement.name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingTools { missing })
    }
}

/// Probe and require in one step, returning the resolved critical tools.
///
/// # Errors
///
/// Returns [`MissingTools`] if any critical tool is absent.
pub fn check_requirements<F>(
    requirements: &[Requirement],
    lookup: F,
) -> Result<Vec<ResolvedTool>, MissingTools>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let checks = probe(requirements, lookup);
    ensure_available(&checks)?;
    Ok(checks.into_iter().filter_map(|c| c.found).collect())
}
