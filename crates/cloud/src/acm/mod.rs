//! AWS Certificate Manager issuance.
//!
//! Request (or reuse) a DNS-validated certificate, wait for ACM to publish
//! the validation CNAME, hand that record to the caller so the domain owner
//! can create it, then wait for the certificate to reach `ISSUED`.

mod models;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

pub use models::{
    CertificateDescription, CertificateStatus, CertificateSummary, DescribeCertificateResponse,
    DomainValidation, ListCertificatesResponse, RequestCertificateResponse, ResourceRecord,
};

use crate::exec::{run_checked, CommandError, CommandRunner, CommandSpec};
use crate::poll::{poll_until, PollConfig, PollExhausted, Probe};

/// Default attempts while waiting for `ISSUED`.
pub const CHECK_COUNT_CERT: u32 = 60;

/// Default seconds between issuance checks.
pub const CERT_CHECK_INTERVAL_SECS: u64 = 30;

/// Errors from the certificate workflow.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The `aws` CLI failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The `aws` CLI printed something unexpected.
    #[error("Failed to parse aws acm output: {0}")]
    Parse(#[from] serde_json::Error),

    /// The certificate can no longer be issued.
    #[error("Certificate {arn} is {status}{}", reason_suffix(.reason))]
    Terminal {
        arn: String,
        status: CertificateStatus,
        reason: Option<String>,
    },

    /// The polling budget ran out.
    #[error(transparent)]
    Exhausted(#[from] PollExhausted),

    /// The DNS validation step was abandoned by the caller.
    #[error("DNS validation step aborted: {0}")]
    Aborted(anyhow::Error),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

/// Current view of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetail {
    pub arn: String,
    pub domain: String,
    pub status: CertificateStatus,
    /// DNS CNAME ACM expects, once published.
    pub validation_record: Option<ResourceRecord>,
    pub failure_reason: Option<String>,
}

impl From<CertificateDescription> for CertificateDetail {
    fn from(desc: CertificateDescription) -> Self {
        let validation_record = desc
            .domain_validation_options
            .iter()
            .find(|v| v.domain_name.eq_ignore_ascii_case(&desc.domain_name))
            .or_else(|| desc.domain_validation_options.first())
            .and_then(|v| v.resource_record.clone());

        Self {
            arn: desc.certificate_arn,
            domain: desc.domain_name,
            status: desc.status,
            validation_record,
            failure_reason: desc.failure_reason,
        }
    }
}

/// Thin wrapper over `aws acm` for one region.
#[derive(Clone)]
pub struct AcmClient {
    runner: Arc<dyn CommandRunner>,
    region: String,
}

impl AcmClient {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, region: impl Into<String>) -> Self {
        Self {
            runner,
            region: region.into(),
        }
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    fn acm<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        CommandSpec::new("aws")
            .arg("acm")
            .args(args)
            .args(["--region", self.region.as_str(), "--output", "json"])
    }

    fn call<T: serde::de::DeserializeOwned>(&self, spec: &CommandSpec) -> Result<T, CertificateError> {
        let stdout = run_checked(self.runner.as_ref(), spec)?;
        Ok(serde_json::from_str(&stdout)?)
    }

    /// Find an issued or pending certificate for exactly `domain`.
    ///
    /// Issued certificates win over pending ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the CLI fails or prints unparseable output.
    pub fn find_reusable(&self, domain: &str) -> Result<Option<String>, CertificateError> {
        let spec = self.acm([
            "list-certificates",
            "--certificate-statuses",
            "ISSUED",
            "PENDING_VALIDATION",
        ]);
        let list: ListCertificatesResponse = self.call(&spec)?;

        let mut matching: Vec<_> = list
            .certificate_summary_list
            .into_iter()
            .filter(|c| c.domain_name.eq_ignore_ascii_case(domain))
            .collect();
        matching.sort_by_key(|c| c.status != Some(CertificateStatus::Issued));

        Ok(matching.into_iter().next().map(|c| c.certificate_arn))
    }

    /// Request a new DNS-validated certificate and return its ARN.
    ///
    /// # Errors
    ///
    /// Returns an error if the CLI fails or prints unparseable output.
    pub fn request(&self, domain: &str) -> Result<String, CertificateError> {
        info!(domain, region = %self.region, "Requesting ACM certificate");
        let spec = self.acm([
            "request-certificate",
            "--domain-name",
            domain,
            "--validation-method",
            "DNS",
        ]);
        let response: RequestCertificateResponse = self.call(&spec)?;
        info!(arn = %response.certificate_arn, "Certificate requested");
        Ok(response.certificate_arn)
    }

    /// Describe a certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the CLI fails or prints unparseable output.
    pub fn describe(&self, arn: &str) -> Result<CertificateDetail, CertificateError> {
        let spec = self.acm(["describe-certificate", "--certificate-arn", arn]);
        let response: DescribeCertificateResponse = self.call(&spec)?;
        Ok(response.certificate.into())
    }

    fn check_terminal(detail: CertificateDetail) -> Result<CertificateDetail, CertificateError> {
        if detail.status.is_terminal_failure() {
            Err(CertificateError::Terminal {
                arn: detail.arn,
                status: detail.status,
                reason: detail.failure_reason,
            })
        } else {
            Ok(detail)
        }
    }

    /// Wait until ACM publishes the validation CNAME (or the certificate is
    /// already issued).
    ///
    /// # Errors
    ///
    /// Returns an error on CLI failure, terminal status, or an exhausted budget.
    pub async fn wait_for_validation_record(
        &self,
        arn: &str,
        poll: &PollConfig,
    ) -> Result<CertificateDetail, CertificateError> {
        poll_until(poll, &format!("validation record for {arn}"), |_| {
            let detail = Self::check_terminal(self.describe(arn)?)?;
            if detail.status == CertificateStatus::Issued || detail.validation_record.is_some() {
                Ok(Probe::Ready(detail))
            } else {
                Ok(Probe::Pending(detail.status.to_string()))
            }
        })
        .await
    }

    /// Wait until the certificate is `ISSUED`.
    ///
    /// Performs at most `poll.max_attempts` describes.
    ///
    /// # Errors
    ///
    /// Returns an error on CLI failure, terminal status, or an exhausted budget.
    pub async fn wait_for_issued(
        &self,
        arn: &str,
        poll: &PollConfig,
    ) -> Result<CertificateDetail, CertificateError> {
        info!(
            arn,
            max_attempts = poll.max_attempts,
            interval_secs = poll.interval.as_secs(),
            "Waiting for certificate to be issued"
        );

        poll_until(poll, &format!("certificate {arn} to be ISSUED"), |attempt| {
            let detail = Self::check_terminal(self.describe(arn)?)?;
            if detail.status == CertificateStatus::Issued {
                info!(arn, attempt, "Certificate issued");
                Ok(Probe::Ready(detail))
            } else {
                Ok(Probe::Pending(detail.status.to_string()))
            }
        })
        .await
    }
}

/// A certificate ready for use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObtainedCertificate {
    pub arn: String,
    /// Whether an existing certificate was reused.
    pub reused: bool,
}

/// Request-or-reuse, prompt, and wait, parameterised by poll budgets.
pub struct CertificateWorkflow<'a> {
    client: &'a AcmClient,
    record_poll: PollConfig,
    issue_poll: PollConfig,
}

impl<'a> CertificateWorkflow<'a> {
    #[must_use]
    pub fn new(client: &'a AcmClient) -> Self {
        Self {
            client,
            record_poll: PollConfig::fixed(20, 5),
            issue_poll: PollConfig::fixed(CHECK_COUNT_CERT, CERT_CHECK_INTERVAL_SECS),
        }
    }

    /// Budget for ACM to publish the validation record.
    #[must_use]
    pub fn with_record_poll(mut self, poll: PollConfig) -> Self {
        self.record_poll = poll;
        self
    }

    /// Budget for the certificate to reach `ISSUED`.
    #[must_use]
    pub fn with_issue_poll(mut self, poll: PollConfig) -> Self {
        self.issue_poll = poll;
        self
    }

    /// Obtain an issued certificate for `domain`.
    ///
    /// `on_record` runs once with the validation CNAME when the certificate
    /// is not yet issued; returning an error abandons the workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if any ACM call fails, the certificate fails, the
    /// callback fails, or a polling budget runs out.
    pub async fn obtain<F>(
        &self,
        domain: &str,
        on_record: F,
    ) -> Result<ObtainedCertificate, CertificateError>
    where
        F: FnOnce(&CertificateDetail, &ResourceRecord) -> anyhow::Result<()>,
    {
        let (arn, reused) = match self.client.find_reusable(domain)? {
            Some(arn) => {
                info!(domain, arn = %arn, "Reusing existing ACM certificate");
                (arn, true)
            }
            None => (self.client.request(domain)?, false),
        };

        let detail = self
            .client
            .wait_for_validation_record(&arn, &self.record_poll)
            .await?;

        if detail.status == CertificateStatus::Issued {
            return Ok(ObtainedCertificate { arn, reused });
        }

        match &detail.validation_record {
            Some(record) => on_record(&detail, record).map_err(CertificateError::Aborted)?,
            None => warn!(arn = %arn, "No validation record published"),
        }

        self.client.wait_for_issued(&arn, &self.issue_poll).await?;
        Ok(ObtainedCertificate { arn, reused })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::exec::{CommandOutput, MockCommandRunner};

    const ARN: &str = "arn:aws:acm:us-east-1:123456789012:certificate/abc";

    fn describe_json(status: &str, with_record: bool) -> String {
        let record = if with_record {
            r#","ResourceRecord":{"Name":"_a.demo.opengovernance.io.","Type":"CNAME","Value":"_b.acm-validations.aws."}"#
        } else {
            ""
        };
        format!(
            r#"{{"Certificate":{{"CertificateArn":"{ARN}","DomainName":"demo.opengovernance.io","Status":"{status}","DomainValidationOptions":[{{"DomainName":"demo.opengovernance.io"{record}}}]}}}}"#
        )
    }

    fn fast(attempts: u32) -> PollConfig {
        PollConfig::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_issued_only_after_second_poll() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(2).returning(move |spec| {
            assert!(spec.args.contains(&"describe-certificate".to_string()));
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let status = if n == 0 { "PENDING_VALIDATION" } else { "ISSUED" };
            Ok(CommandOutput::ok(describe_json(status, true)))
        });

        let client = AcmClient::new(Arc::new(runner), "us-east-1");
        let detail = client.wait_for_issued(ARN, &fast(10)).await.unwrap();

        assert_eq!(detail.status, CertificateStatus::Issued);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_never_issued_stops_after_check_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput::ok(describe_json("PENDING_VALIDATION", true)))
        });

        let client = AcmClient::new(Arc::new(runner), "us-east-1");
        let err = client.wait_for_issued(ARN, &fast(7)).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 7);
        match err {
            CertificateError::Exhausted(e) => {
                assert_eq!(e.attempts, 7);
                assert_eq!(e.last_status.as_deref(), Some("PENDING_VALIDATION"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failed_status_aborts_immediately() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_| Ok(CommandOutput::ok(describe_json("FAILED", false))));

        let client = AcmClient::new(Arc::new(runner), "us-east-1");
        let err = client.wait_for_issued(ARN, &fast(10)).await.unwrap_err();
        assert!(matches!(
            err,
            CertificateError::Terminal {
                status: CertificateStatus::Failed,
                ..
            }
        ));
    }

    #[test]
    fn test_find_reusable_prefers_issued() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_| {
            Ok(CommandOutput::ok(
                r#"{"CertificateSummaryList":[
                    {"CertificateArn":"arn:pending","DomainName":"demo.opengovernance.io","Status":"PENDING_VALIDATION"},
                    {"CertificateArn":"arn:other","DomainName":"other.io","Status":"ISSUED"},
                    {"CertificateArn":"arn:issued","DomainName":"Demo.OpenGovernance.io","Status":"ISSUED"}
                ]}"#,
            ))
        });

        let client = AcmClient::new(Arc::new(runner), "us-east-1");
        let arn = client.find_reusable("demo.opengovernance.io").unwrap();
        assert_eq!(arn.as_deref(), Some("arn:issued"));
    }

    #[tokio::test]
    async fn test_workflow_requests_prompts_and_waits() {
        let describes = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&describes);

        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |spec| {
            let sub = spec.args.get(1).map(String::as_str);
            let out = match sub {
                Some("list-certificates") => r#"{"CertificateSummaryList":[]}"#.to_string(),
                Some("request-certificate") => format!(r#"{{"CertificateArn":"{ARN}"}}"#),
                Some("describe-certificate") => {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    match n {
                        0 => describe_json("PENDING_VALIDATION", false),
                        1 | 2 => describe_json("PENDING_VALIDATION", true),
                        _ => describe_json("ISSUED", true),
                    }
                }
                other => panic!("unexpected subcommand {other:?}"),
            };
            Ok(CommandOutput::ok(out))
        });

        let client = AcmClient::new(Arc::new(runner), "us-east-1");
        let mut prompted = None;
        let cert = CertificateWorkflow::new(&client)
            .with_record_poll(fast(5))
            .with_issue_poll(fast(5))
            .obtain("demo.opengovernance.io", |_, record| {
                prompted = Some(record.name.clone());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(cert.arn, ARN);
        assert!(!cert.reused);
        assert_eq!(prompted.as_deref(), Some("_a.demo.opengovernance.io."));
        assert_eq!(describes.load(Ordering::SeqCst), 4);
    }
}
