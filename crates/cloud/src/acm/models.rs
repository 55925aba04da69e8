//! `aws acm` JSON output models.

use serde::{Deserialize, Serialize};

/// ACM certificate status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    /// Waiting for the DNS validation record.
    PendingValidation,
    /// Issued and usable by load balancers.
    Issued,
    Inactive,
    Expired,
    ValidationTimedOut,
    Revoked,
    Failed,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl CertificateStatus {
    /// Statuses from which a certificate never becomes `ISSUED`.
    #[must_use]
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            Self::Inactive | Self::Expired | Self::ValidationTimedOut | Self::Revoked | Self::Failed
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingValidation => "PENDING_VALIDATION",
            Self::Issued => "ISSUED",
            Self::Inactive => "INACTIVE",
            Self::Expired => "EXPIRED",
            Self::ValidationTimedOut => "VALIDATION_TIMED_OUT",
            Self::Revoked => "REVOKED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `aws acm request-certificate` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestCertificateResponse {
    pub certificate_arn: String,
}

/// `aws acm list-certificates` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListCertificatesResponse {
    #[serde(default)]
    pub certificate_summary_list: Vec<CertificateSummary>,
}

/// One entry of `list-certificates`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateSummary {
    pub certificate_arn: String,
    pub domain_name: String,
    /// Present on recent CLI versions only.
    pub status: Option<CertificateStatus>,
}

/// `aws acm describe-certificate` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeCertificateResponse {
    pub certificate: CertificateDescription,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateDescription {
    pub certificate_arn: String,
    pub domain_name: String,
    pub status: CertificateStatus,
    #[serde(default)]
    pub domain_validation_options: Vec<DomainValidation>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DomainValidation {
    pub domain_name: String,
    pub validation_status: Option<String>,
    pub validation_method: Option<String>,
    /// Published by ACM a few seconds after the request.
    pub resource_record: Option<ResourceRecord>,
}

/// DNS record ACM asks the domain owner to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    #[serde(rename = "Value")]
    pub value: String,
}
