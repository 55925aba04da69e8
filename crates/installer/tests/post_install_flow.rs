//! Post-install against scripted `dig`, `helm`, `kubectl` and `aws`.

mod common;

use std::sync::Arc;

use common::ScriptedRunner;
use og_cloud::{CloudProvider, CommandOutput};
use og_installer::config::PollSettings;
use og_installer::post_install::{PostInstall, PostInstallOptions};
use og_installer::prompt::NonInteractive;
use og_installer::{IngressDetails, InstallType};

const DOMAIN: &str = "demo.opengovernance.io";
const LB_HOST: &str = "k8s-opengove-0123456789.us-east-1.elb.amazonaws.com";
const ARN: &str = "arn:aws:acm:us-east-1:123456789012:certificate/5a6b";

fn details(install_type: InstallType, certificate_arn: Option<&str>) -> IngressDetails {
    IngressDetails {
        provider: CloudProvider::Aws,
        install_type,
        domain: Some(DOMAIN.into()),
        certificate_arn: certificate_arn.map(Into::into),
        lb_dns: LB_HOST.into(),
        namespace: "opengovernance".into(),
        ingress_name: "opengovernance-ingress".into(),
        helm_release: "opengovernance".into(),
        helm_chart: "opengovernance/opengovernance".into(),
    }
}

fn options() -> PostInstallOptions {
    PostInstallOptions {
        region: Some("us-east-1".into()),
        silent: true,
        poll: PollSettings::default().immediate(),
        ..PostInstallOptions::default()
    }
}

fn base_script() -> ScriptedRunner {
    ScriptedRunner::new()
        .script(
            &format!("dig +short {DOMAIN} CNAME"),
            [
                CommandOutput::ok(""),
                CommandOutput::ok(format!("{LB_HOST}.\n")),
            ],
        )
        .script(&format!("dig +short {DOMAIN} A"), [CommandOutput::ok("")])
        .script("helm upgrade", [CommandOutput::ok("")])
        .script("kubectl rollout restart", [CommandOutput::ok("restarted")])
}

#[tokio::test]
async fn http_post_install_waits_for_dns_then_restarts_proxy() {
    let runner = Arc::new(base_script());

    let outcome = PostInstall::new(
        runner.clone(),
        details(InstallType::Http, None),
        options(),
        &NonInteractive,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(outcome.url, format!("http://{DOMAIN}"));
    assert!(!outcome.certificate_obtained);
    assert_eq!(runner.count("aws"), 0);
    // First lookup misses, the wait sees the CNAME.
    assert_eq!(runner.count(&format!("dig +short {DOMAIN} CNAME")), 2);

    let upgrade = runner
        .calls()
        .into_iter()
        .find(|c| c.starts_with("helm upgrade"))
        .unwrap();
    assert!(upgrade.contains("--reuse-values"));
    assert!(!upgrade.contains("--create-namespace"));
    assert!(upgrade.contains(&format!("--set global.domain={DOMAIN}")));
    assert!(runner
        .calls()
        .contains(&"kubectl rollout restart deployment/nginx-proxy -n opengovernance".to_string()));
}

#[tokio::test]
async fn https_post_install_checks_existing_certificate() {
    let runner = Arc::new(base_script().script(
        "aws acm describe-certificate",
        [CommandOutput::ok(format!(
            r#"{{"Certificate":{{"CertificateArn":"{ARN}","DomainName":"{DOMAIN}","Status":"ISSUED"}}}}"#
        ))],
    ));

    let outcome = PostInstall::new(
        runner.clone(),
        details(InstallType::Https, Some(ARN)),
        options(),
        &NonInteractive,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(outcome.url, format!("https://{DOMAIN}"));
    assert_eq!(outcome.certificate_arn.as_deref(), Some(ARN));
    assert!(!outcome.certificate_obtained);
    assert_eq!(runner.count("aws acm describe-certificate"), 1);
    assert_eq!(runner.count("aws acm request-certificate"), 0);
}

fn describe(status: &str) -> CommandOutput {
    CommandOutput::ok(format!(
        r#"{{"Certificate":{{
            "CertificateArn":"{ARN}",
            "DomainName":"{DOMAIN}",
            "Status":"{status}",
            "DomainValidationOptions":[{{
                "DomainName":"{DOMAIN}",
                "ValidationMethod":"DNS",
                "ResourceRecord":{{"Name":"_a1.{DOMAIN}.","Type":"CNAME","Value":"_b2.acm-validations.aws."}}
            }}]
        }}}}"#
    ))
}

#[tokio::test]
async fn https_post_install_records_new_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ingress_details.env");
    details(InstallType::Https, None).write(&path).unwrap();

    let runner = Arc::new(
        base_script()
            .script(
                "aws acm list-certificates",
                [CommandOutput::ok(r#"{"CertificateSummaryList":[]}"#)],
            )
            .script(
                "aws acm request-certificate",
                [CommandOutput::ok(format!(r#"{{"CertificateArn":"{ARN}"}}"#))],
            )
            .script(
                "aws acm describe-certificate",
                [describe("PENDING_VALIDATION"), describe("ISSUED")],
            )
            .script("kubectl apply", [CommandOutput::ok("configured")]),
    );

    let outcome = PostInstall::new(
        runner.clone(),
        IngressDetails::load(&path).unwrap(),
        PostInstallOptions {
            details_path: Some(path.clone()),
            ..options()
        },
        &NonInteractive,
    )
    .run()
    .await
    .unwrap();

    assert!(outcome.certificate_obtained);
    assert_eq!(outcome.certificate_arn.as_deref(), Some(ARN));
    assert_eq!(runner.count("kubectl apply"), 1);

    // A later run sees the certificate instead of requesting another.
    let reloaded = IngressDetails::load(&path).unwrap();
    assert_eq!(reloaded.certificate_arn.as_deref(), Some(ARN));
    assert_eq!(reloaded.lb_dns, LB_HOST);
}

#[tokio::test]
async fn post_install_without_dig_skips_dns_wait() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .script("helm upgrade", [CommandOutput::ok("")])
            .script("kubectl rollout restart", [CommandOutput::ok("")]),
    );

    let outcome = PostInstall::new(
        runner.clone(),
        details(InstallType::Http, None),
        PostInstallOptions {
            check_dns: false,
            ..options()
        },
        &NonInteractive,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(outcome.url, format!("http://{DOMAIN}"));
    assert_eq!(runner.count("dig"), 0);
}

#[tokio::test]
async fn post_install_requires_a_domain() {
    let runner = Arc::new(ScriptedRunner::new());
    let mut minimal = details(InstallType::Minimal, None);
    minimal.domain = None;

    let err = PostInstall::new(runner.clone(), minimal, options(), &NonInteractive)
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("No DOMAIN"));
    assert!(runner.calls().is_empty());
}
