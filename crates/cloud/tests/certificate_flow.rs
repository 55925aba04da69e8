//! End-to-end certificate issuance against scripted `aws acm` output.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ScriptedRunner;
use og_cloud::acm::{AcmClient, CertificateError, CertificateStatus, CertificateWorkflow};
use og_cloud::{CommandOutput, PollConfig};

const ARN: &str = "arn:aws:acm:us-east-1:123456789012:certificate/0f3c";
const DESCRIBE: &str = "aws acm describe-certificate";

fn describe(status: &str) -> CommandOutput {
    CommandOutput::ok(format!(
        r#"{{"Certificate":{{
            "CertificateArn":"{ARN}",
            "DomainName":"demo.opengovernance.io",
            "Status":"{status}",
            "DomainValidationOptions":[{{
                "DomainName":"demo.opengovernance.io",
                "ValidationMethod":"DNS",
                "ResourceRecord":{{"Name":"_c1.demo.opengovernance.io.","Type":"CNAME","Value":"_c2.acm-validations.aws."}}
            }}]
        }}}}"#
    ))
}

fn fast(attempts: u32) -> PollConfig {
    PollConfig::new(attempts, Duration::ZERO)
}

#[tokio::test]
async fn pending_then_issued_succeeds_on_second_poll() {
    let runner = Arc::new(ScriptedRunner::new().script(
        DESCRIBE,
        [describe("PENDING_VALIDATION"), describe("ISSUED")],
    ));
    let client = AcmClient::new(runner.clone(), "us-east-1");

    let detail = client.wait_for_issued(ARN, &fast(60)).await.unwrap();

    assert_eq!(detail.status, CertificateStatus::Issued);
    assert_eq!(runner.count(DESCRIBE), 2);
}

#[tokio::test]
async fn polling_stops_after_exact_check_count() {
    let runner = Arc::new(ScriptedRunner::new().script(DESCRIBE, [describe("PENDING_VALIDATION")]));
    let client = AcmClient::new(runner.clone(), "us-east-1");

    let check_count = 12;
    let err = client
        .wait_for_issued(ARN, &fast(check_count))
        .await
        .unwrap_err();

    assert!(matches!(err, CertificateError::Exhausted(_)));
    assert_eq!(runner.count(DESCRIBE), check_count as usize);
}

#[tokio::test]
async fn existing_issued_certificate_is_reused_without_prompt() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .script(
                "aws acm list-certificates",
                [CommandOutput::ok(format!(
                    r#"{{"CertificateSummaryList":[{{"CertificateArn":"{ARN}","DomainName":"demo.opengovernance.io","Status":"ISSUED"}}]}}"#
                ))],
            )
            .script(DESCRIBE, [describe("ISSUED")]),
    );
    let client = AcmClient::new(runner.clone(), "us-east-1");

    let cert = CertificateWorkflow::new(&client)
        .with_record_poll(fast(3))
        .with_issue_poll(fast(3))
        .obtain("demo.opengovernance.io", |_, _| {
            panic!("no DNS prompt expected for an issued certificate")
        })
        .await
        .unwrap();

    assert_eq!(cert.arn, ARN);
    assert!(cert.reused);
    assert_eq!(runner.count("aws acm request-certificate"), 0);
}

#[tokio::test]
async fn aborted_prompt_stops_the_workflow() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .script(
                "aws acm list-certificates",
                [CommandOutput::ok(r#"{"CertificateSummaryList":[]}"#)],
            )
            .script(
                "aws acm request-certificate",
                [CommandOutput::ok(format!(r#"{{"CertificateArn":"{ARN}"}}"#))],
            )
            .script(DESCRIBE, [describe("PENDING_VALIDATION")]),
    );
    let client = AcmClient::new(runner.clone(), "us-east-1");

    let err = CertificateWorkflow::new(&client)
        .with_record_poll(fast(3))
        .with_issue_poll(fast(3))
        .obtain("demo.opengovernance.io", |_, _| {
            Err(anyhow::anyhow!("user declined"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CertificateError::Aborted(_)));
    assert_eq!(runner.count(DESCRIBE), 1);
}

#[tokio::test]
async fn region_is_passed_to_every_call() {
    let runner = Arc::new(ScriptedRunner::new().script(DESCRIBE, [describe("ISSUED")]));
    let client = AcmClient::new(runner.clone(), "ap-southeast-2");

    client.describe(ARN).unwrap();

    assert!(runner.calls()[0].contains("--region ap-southeast-2"));
}
