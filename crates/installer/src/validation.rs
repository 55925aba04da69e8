//! Input validation for user-supplied domains, emails and names.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Hostname with at least two labels; labels start and end alphanumeric.
static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$").unwrap()
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap()
});

/// DNS-1123 label, which every provider accepts as a cluster name.
static CLUSTER_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([a-z0-9-]{0,38}[a-z0-9])?$").unwrap());

/// A rejected input value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid domain '{0}' (expected something like demo.opengovernance.io)")]
    InvalidDomain(String),

    #[error("Invalid email address '{0}'")]
    InvalidEmail(String),

    #[error("Invalid cluster name '{0}' (lowercase letters, digits and '-', max 40 characters)")]
    InvalidClusterName(String),
}

#[must_use]
pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253 && DOMAIN_PATTERN.is_match(domain)
}

#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// # Errors
///
/// Returns [`ValidationError::InvalidDomain`] if `domain` is not a hostname.
pub fn validate_domain(domain: &str) -> Result<(), ValidationError> {
    if is_valid_domain(domain) {
        Ok(())
    } else {
        Err(ValidationError::InvalidDomain(domain.to_string()))
    }
}

/// # Errors
///
/// Returns [`ValidationError::InvalidEmail`] if `email` is malformed.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

/// # Errors
///
/// Returns [`ValidationError::InvalidClusterName`] if `name` is not a DNS label.
pub fn validate_cluster_name(name: &str) -> Result<(), ValidationError> {
    if CLUSTER_NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidClusterName(name.to_string()))
    }
}
