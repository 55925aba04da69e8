//! Kubernetes manifests the installer applies.
//!
//! Ingresses are built from `k8s-openapi` types. The cert-manager
//! `ClusterIssuer` is a CRD, so it is assembled as plain JSON.

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

/// TLS termination for an ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressTls {
    /// Plain HTTP.
    None,
    /// Terminated at the AWS ALB with an ACM certificate.
    AcmCertificate(String),
    /// Let's Encrypt certificate managed by cert-manager.
    CertManager { issuer: String, secret_name: String },
}

/// Inputs shared by every ingress flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressOptions {
    pub name: String,
    pub namespace: String,
    /// Host rule; `None` matches any host.
    pub host: Option<String>,
    pub service_name: String,
    pub service_port: i32,
    pub tls: IngressTls,
}

fn backend_rule(opts: &IngressOptions) -> IngressRule {
    IngressRule {
        host: opts.host.clone(),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".into()),
                path_type: "Prefix".into(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: opts.service_name.clone(),
                        port: Some(ServiceBackendPort {
                            number: Some(opts.service_port),
                            ..ServiceBackendPort::default()
                        }),
                    }),
                    ..IngressBackend::default()
                },
            }],
        }),
    }
}

fn ingress(
    opts: &IngressOptions,
    class: &str,
    annotations: BTreeMap<String, String>,
    tls: Option<Vec<IngressTLS>>,
) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(opts.name.clone()),
            namespace: Some(opts.namespace.clone()),
            annotations: (!annotations.is_empty()).then_some(annotations),
            ..ObjectMeta::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some(class.to_string()),
            rules: Some(vec![backend_rule(opts)]),
            tls,
            ..IngressSpec::default()
        }),
        ..Ingress::default()
    }
}

/// Ingress for the AWS Load Balancer Controller.
#[must_use]
pub fn alb_ingress(opts: &IngressOptions) -> Ingress {
    let mut annotations = BTreeMap::from([
        (
            "alb.ingress.kubernetes.io/scheme".to_string(),
            "internet-facing".to_string(),
        ),
        (
            "alb.ingress.kubernetes.io/target-type".to_string(),
            "ip".to_string(),
        ),
    ]);

    if let IngressTls::AcmCertificate(arn) = &opts.tls {
        annotations.extend([
            (
                "alb.ingress.kubernetes.io/listen-ports".to_string(),
                r#"[{"HTTP": 80}, {"HTTPS": 443}]"#.to_string(),
            ),
            (
                "alb.ingress.kubernetes.io/certificate-arn".to_string(),
                arn.clone(),
            ),
            (
                "alb.ingress.kubernetes.io/ssl-redirect".to_string(),
                "443".to_string(),
            ),
        ]);
    } else {
        annotations.insert(
            "alb.ingress.kubernetes.io/listen-ports".to_string(),
            r#"[{"HTTP": 80}]"#.to_string(),
        );
    }

    ingress(opts, "alb", annotations, None)
}

/// Ingress for ingress-nginx, optionally with a cert-manager certificate.
#[must_use]
pub fn nginx_ingress(opts: &IngressOptions) -> Ingress {
    match &opts.tls {
        IngressTls::CertManager {
            issuer,
            secret_name,
        } => {
            let annotations = BTreeMap::from([(
                "cert-manager.io/cluster-issuer".to_string(),
                issuer.clone(),
            )]);
            let tls = vec![IngressTLS {
                hosts: opts.host.clone().map(|h| vec![h]),
                secret_name: Some(secret_name.clone()),
            }];
            ingress(opts, "nginx", annotations, Some(tls))
        }
        _ => ingress(opts, "nginx", BTreeMap::new(), None),
    }
}

/// Let's Encrypt production `ClusterIssuer` solving HTTP-01 through
/// `ingress_class`.
#[must_use]
pub fn letsencrypt_cluster_issuer(name: &str, email: &str, ingress_class: &str) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "cert-manager.io/v1",
        "kind": "ClusterIssuer",
        "metadata": { "name": name },
        "spec": {
            "acme": {
                "server": "https://acme-v02.api.letsencrypt.org/directory",
                "email": email,
                "privateKeySecretRef": { "name": format!("{name}-account-key") },
                "solvers": [
                    { "http01": { "ingress": { "ingressClassName": ingress_class } } }
                ]
            }
        }
    })
}

/// Render any manifest as YAML for `kubectl apply -f -`.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_yaml<T: Serialize>(manifest: &T) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(tls: IngressTls) -> IngressOptions {
        IngressOptions {
            name: "opengovernance-ingress".into(),
            namespace: "opengovernance".into(),
            host: Some("demo.opengovernance.io".into()),
            service_name: "nginx-proxy".into(),
            service_port: 80,
            tls,
        }
    }

    fn annotation<'a>(ingress: &'a Ingress, key: &str) -> Option<&'a str> {
        ingress
            .metadata
            .annotations
            .as_ref()?
            .get(key)
            .map(String::as_str)
    }

    #[test]
    fn test_alb_https_annotations() {
        let ing = alb_ingress(&opts(IngressTls::AcmCertificate("arn:cert".into())));
        assert_eq!(
            annotation(&ing, "alb.ingress.kubernetes.io/certificate-arn"),
            Some("arn:cert")
        );
        assert_eq!(
            annotation(&ing, "alb.ingress.kubernetes.io/ssl-redirect"),
            Some("443")
        );
        assert_eq!(
            ing.spec.as_ref().unwrap().ingress_class_name.as_deref(),
            Some("alb")
        );
    }

    #[test]
    fn test_alb_http_has_no_certificate() {
        let ing = alb_ingress(&opts(IngressTls::None));
        assert!(annotation(&ing, "alb.ingress.kubernetes.io/certificate-arn").is_none());
        assert_eq!(
            annotation(&ing, "alb.ingress.kubernetes.io/listen-ports"),
            Some(r#"[{"HTTP": 80}]"#)
        );
    }

    #[test]
    fn test_nginx_tls_block() {
        let ing = nginx_ingress(&opts(IngressTls::CertManager {
            issuer: "letsencrypt".into(),
            secret_name: "opengovernance-tls".into(),
        }));
        let spec = ing.spec.as_ref().unwrap();
        let tls = &spec.tls.as_ref().unwrap()[0];
        assert_eq!(tls.secret_name.as_deref(), Some("opengovernance-tls"));
        assert_eq!(tls.hosts.as_deref(), Some(&["demo.opengovernance.io".to_string()][..]));
        assert_eq!(
            annotation(&ing, "cert-manager.io/cluster-issuer"),
            Some("letsencrypt")
        );
    }

    #[test]
    fn test_yaml_carries_kind_and_backend() {
        let yaml = to_yaml(&nginx_ingress(&opts(IngressTls::None))).unwrap();
        assert!(yaml.contains("kind: Ingress"));
        assert!(yaml.contains("apiVersion: networking.k8s.io/v1"));
        assert!(yaml.contains("name: nginx-proxy"));
        assert!(yaml.contains("host: demo.opengovernance.io"));
    }

    #[test]
    fn test_cluster_issuer() {
        let issuer = letsencrypt_cluster_issuer("letsencrypt", "ops@example.com", "nginx");
        assert_eq!(issuer["kind"], "ClusterIssuer");
        assert_eq!(issuer["spec"]["acme"]["email"], "ops@example.com");
        assert_eq!(
            issuer["spec"]["acme"]["solvers"][0]["http01"]["ingress"]["ingressClassName"],
            "nginx"
        );
    }
}
