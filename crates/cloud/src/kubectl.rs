//! `kubectl` wrapper.
//!
//! Objects are fetched as JSON and decoded into `k8s-openapi` types so pod
//! readiness and load-balancer addresses are read from typed fields instead
//! of grepping tabular output.

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::exec::{run_checked, CommandError, CommandRunner, CommandSpec};
use crate::poll::{poll_until, PollConfig, Probe};

/// `kubectl get ... -o json` list envelope.
///
/// kubectl reports `kind: List`, so the typed `k8s_openapi::List` does not apply.
#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Where a load balancer can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBalancerTarget {
    /// DNS name (AWS ELB/ALB).
    Hostname(String),
    /// IP address (GKE, DigitalOcean).
    Ip(String),
}

impl LoadBalancerTarget {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hostname(s) | Self::Ip(s) => s,
        }
    }

    /// DNS record type the domain owner should create.
    #[must_use]
    pub fn record_type(&self) -> &'static str {
        match self {
            Self::Hostname(_) => "CNAME",
            Self::Ip(_) => "A",
        }
    }

    /// Rebuild a target from a stored address string.
    #[must_use]
    pub fn from_address(address: &str) -> Self {
        let address = address.trim();
        if address.parse::<std::net::IpAddr>().is_ok() {
            Self::Ip(address.to_string())
        } else {
            Self::Hostname(address.to_string())
        }
    }

    fn from_parts(hostname: Option<&String>, ip: Option<&String>) -> Option<Self> {
        hostname
            .filter(|h| !h.is_empty())
            .map(|h| Self::Hostname(h.clone()))
            .or_else(|| ip.filter(|i| !i.is_empty()).map(|i| Self::Ip(i.clone())))
    }
}

impl fmt::Display for LoadBalancerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness summary of the pods in a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodReadiness {
    pub total: usize,
    pub ready: usize,
    /// Names of pods that are neither ready nor completed.
    pub not_ready: Vec<String>,
}

impl PodReadiness {
    /// All pods ready, and at least one pod exists.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.total > 0 && self.ready == self.total
    }

    #[must_use]
    pub fn from_pods(pods: &[Pod]) -> Self {
        let mut summary = Self {
            total: pods.len(),
            ..Self::default()
        };

        for pod in pods {
            if pod_is_ready(pod) {
                summary.ready += 1;
            } else {
                summary
                    .not_ready
                    .push(pod.metadata.name.clone().unwrap_or_default());
            }
        }
        summary
    }
}

impl fmt::Display for PodReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} pods ready", self.ready, self.total)
    }
}

/// Running with every container ready, or completed successfully (jobs).
fn pod_is_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else {
        return false;
    };

    match status.phase.as_deref() {
        Some("Succeeded") => true,
        Some("Running") => status
            .container_statuses
            .as_ref()
            .is_some_and(|cs| !cs.is_empty() && cs.iter().all(|c| c.ready)),
        _ => false,
    }
}

/// Extract the first load-balancer address from an ingress.
#[must_use]
pub fn ingress_target(ingress: &Ingress) -> Option<LoadBalancerTarget> {
    ingress
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .iter()
        .find_map(|lb| LoadBalancerTarget::from_parts(lb.hostname.as_ref(), lb.ip.as_ref()))
}

/// Extract the first load-balancer address from a service.
#[must_use]
pub fn service_target(service: &Service) -> Option<LoadBalancerTarget> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .iter()
        .find_map(|lb| LoadBalancerTarget::from_parts(lb.hostname.as_ref(), lb.ip.as_ref()))
}

/// `kubectl` bound to an optional context.
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    context: Option<String>,
}

impl Kubectl {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            context: None,
        }
    }

    /// Pin every call to `context` instead of the current one.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn command<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        let spec = CommandSpec::new("kubectl");
        let spec = match &self.context {
            Some(ctx) => spec.arg("--context").arg(ctx.as_str()),
            None => spec,
        };
        spec.args(args)
    }

    fn run(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        run_checked(self.runner.as_ref(), spec)
    }

    fn get_json<T: DeserializeOwned>(&self, spec: &CommandSpec) -> anyhow::Result<T> {
        let stdout = self.run(spec)?;
        serde_json::from_str(&stdout)
            .map_err(|e| anyhow::anyhow!("Failed to parse output of `{spec}`: {e}"))
    }

    /// Name of the active kubeconfig context.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is configured.
    pub fn current_context(&self) -> Result<String, CommandError> {
        let out = self.run(&self.command(["config", "current-context"]))?;
        Ok(out.trim().to_string())
    }

    /// Whether the API server answers.
    #[must_use]
    pub fn cluster_reachable(&self) -> bool {
        self.run(&self.command(["cluster-info", "--request-timeout=10s"]))
            .is_ok()
    }

    /// Create `namespace` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if either kubectl call fails.
    pub fn ensure_namespace(&self, namespace: &str) -> Result<(), CommandError> {
        let manifest = self.run(&self.command([
            "create",
            "namespace",
            namespace,
            "--dry-run=client",
            "-o",
            "yaml",
        ]))?;
        self.apply_manifest(&manifest)?;
        debug!(namespace, "Namespace ensured");
        Ok(())
    }

    /// `kubectl apply -f -` with `yaml` on stdin.
    ///
    /// # Errors
    ///
    /// Returns an error if kubectl rejects the manifest.
    pub fn apply_manifest(&self, yaml: &str) -> Result<String, CommandError> {
        let spec = self.command(["apply", "-f", "-"]).stdin(yaml);
        self.run(&spec)
    }

    /// All pods in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if kubectl fails or prints unparseable JSON.
    pub fn pods(&self, namespace: &str) -> anyhow::Result<Vec<Pod>> {
        let list: ItemList<Pod> =
            self.get_json(&self.command(["get", "pods", "-n", namespace, "-o", "json"]))?;
        Ok(list.items)
    }

    /// # Errors
    ///
    /// Returns an error if kubectl fails or prints unparseable JSON.
    pub fn pod_readiness(&self, namespace: &str) -> anyhow::Result<PodReadiness> {
        Ok(PodReadiness::from_pods(&self.pods(namespace)?))
    }

    /// Poll until every pod in `namespace` is ready.
    ///
    /// `on_progress` sees every readiness sample, including the final one.
    ///
    /// # Errors
    ///
    /// Returns an error if kubectl fails or the budget runs out.
    pub async fn wait_for_pods_ready<F>(
        &self,
        namespace: &str,
        poll: &PollConfig,
        mut on_progress: F,
    ) -> anyhow::Result<PodReadiness>
    where
        F: FnMut(&PodReadiness),
    {
        info!(namespace, "Waiting for pods to become ready");
        poll_until(poll, &format!("pods in {namespace} to be ready"), |_| {
            let readiness = self.pod_readiness(namespace)?;
            on_progress(&readiness);
            if readiness.all_ready() {
                Ok(Probe::Ready(readiness))
            } else {
                Ok(Probe::Pending(readiness.to_string()))
            }
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the ingress does not exist.
    pub fn ingress(&self, namespace: &str, name: &str) -> anyhow::Result<Ingress> {
        self.get_json(&self.command(["get", "ingress", name, "-n", namespace, "-o", "json"]))
    }

    /// # Errors
    ///
    /// Returns an error if the service does not exist.
    pub fn service(&self, namespace: &str, name: &str) -> anyhow::Result<Service> {
        self.get_json(&self.command(["get", "service", name, "-n", namespace, "-o", "json"]))
    }

    /// Poll until the ingress has a load-balancer address.
    ///
    /// # Errors
    ///
    /// Returns an error if kubectl fails or the budget runs out.
    pub async fn wait_for_ingress_address(
        &self,
        namespace: &str,
        name: &str,
        poll: &PollConfig,
    ) -> anyhow::Result<LoadBalancerTarget> {
        info!(namespace, ingress = name, "Waiting for load balancer address");
        poll_until(poll, &format!("ingress {name} load balancer"), |_| {
            Ok(match ingress_target(&self.ingress(namespace, name)?) {
                Some(target) => Probe::Ready(target),
                None => Probe::Pending("no address assigned".into()),
            })
        })
        .await
    }

    /// Poll until a `LoadBalancer` service has an external address.
    ///
    /// # Errors
    ///
    /// Returns an error if kubectl fails or the budget runs out.
    pub async fn wait_for_service_address(
        &self,
        namespace: &str,
        name: &str,
        poll: &PollConfig,
    ) -> anyhow::Result<LoadBalancerTarget> {
        info!(namespace, service = name, "Waiting for external address");
        poll_until(poll, &format!("service {name} external address"), |_| {
            Ok(match service_target(&self.service(namespace, name)?) {
                Some(target) => Probe::Ready(target),
                None => Probe::Pending("pending".into()),
            })
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the deployment does not exist.
    pub fn rollout_restart(&self, namespace: &str, deployment: &str) -> Result<(), CommandError> {
        let target = format!("deployment/{deployment}");
        self.run(&self.command(["rollout", "restart", &target, "-n", namespace]))?;
        info!(namespace, deployment, "Deployment restarted");
        Ok(())
    }

    /// Start `kubectl port-forward` in the background and return its PID.
    ///
    /// The process is not supervised; it keeps running after the installer
    /// exits.
    ///
    /// # Errors
    ///
    /// Returns an error if kubectl cannot be started.
    pub fn port_forward(
        &self,
        namespace: &str,
        target: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Result<u32, CommandError> {
        let ports = format!("{local_port}:{remote_port}");
        let spec = self.command(["port-forward", "-n", namespace, target, &ports]);
        let pid = self.runner.spawn_detached(&spec)?;
        info!(namespace, target, local_port, pid, "Port-forward started");
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::exec::{CommandOutput, MockCommandRunner};

    fn pod_json(name: &str, phase: &str, ready: &[bool]) -> String {
        let containers: Vec<String> = ready
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    r#"{{"name":"c{i}","ready":{r},"restartCount":0,"image":"x","imageID":""}}"#
                )
            })
            .collect();
        format!(
            r#"{{"apiVersion":"v1","kind":"Pod","metadata":{{"name":"{name}"}},"status":{{"phase":"{phase}","containerStatuses":[{}]}}}}"#,
            containers.join(",")
        )
    }

    fn list(items: &[String]) -> String {
        format!(r#"{{"apiVersion":"v1","kind":"List","items":[{}]}}"#, items.join(","))
    }

    #[test]
    fn test_readiness_counts_completed_jobs() {
        let raw = list(&[
            pod_json("web", "Running", &[true, true]),
            pod_json("migrate", "Succeeded", &[false]),
            pod_json("worker", "Running", &[true, false]),
            pod_json("pending", "Pending", &[]),
        ]);
        let pods: ItemList<Pod> = serde_json::from_str(&raw).unwrap();
        let readiness = PodReadiness::from_pods(&pods.items);

        assert_eq!(readiness.total, 4);
        assert_eq!(readiness.ready, 2);
        assert_eq!(readiness.not_ready, vec!["worker", "pending"]);
        assert!(!readiness.all_ready());
    }

    #[test]
    fn test_empty_namespace_is_not_ready() {
        assert!(!PodReadiness::default().all_ready());
    }

    #[test]
    fn test_ingress_target_prefers_hostname() {
        let ingress: Ingress = serde_json::from_str(
            r#"{"apiVersion":"networking.k8s.io/v1","kind":"Ingress","metadata":{"name":"og"},
                "status":{"loadBalancer":{"ingress":[{"hostname":"k8s-og-123.us-east-1.elb.amazonaws.com"}]}}}"#,
        )
        .unwrap();
        assert_eq!(
            ingress_target(&ingress),
            Some(LoadBalancerTarget::Hostname(
                "k8s-og-123.us-east-1.elb.amazonaws.com".into()
            ))
        );
    }

    #[test]
    fn test_service_target_ip() {
        let service: Service = serde_json::from_str(
            r#"{"apiVersion":"v1","kind":"Service","metadata":{"name":"ingress-nginx-controller"},
                "status":{"loadBalancer":{"ingress":[{"ip":"203.0.113.10"}]}}}"#,
        )
        .unwrap();
        let target = service_target(&service).unwrap();
        assert_eq!(target, LoadBalancerTarget::Ip("203.0.113.10".into()));
        assert_eq!(target.record_type(), "A");
    }

    #[test]
    fn test_target_from_stored_address() {
        assert_eq!(
            LoadBalancerTarget::from_address("203.0.113.10"),
            LoadBalancerTarget::Ip("203.0.113.10".into())
        );
        assert_eq!(
            LoadBalancerTarget::from_address(" k8s-og.elb.amazonaws.com\n"),
            LoadBalancerTarget::Hostname("k8s-og.elb.amazonaws.com".into())
        );
    }

    #[tokio::test]
    async fn test_wait_for_pods_retries_until_ready() {
        let mut runner = MockCommandRunner::new();
        let mut seq = mockall::Sequence::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok(list(&[pod_json("web", "Pending", &[])]))));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok(list(&[pod_json("web", "Running", &[true])]))));

        let kubectl = Kubectl::new(Arc::new(runner));
        let mut samples = Vec::new();
        let readiness = kubectl
            .wait_for_pods_ready("opengovernance", &PollConfig::new(5, Duration::ZERO), |r| {
                samples.push((r.ready, r.total));
            })
            .await
            .unwrap();
        assert_eq!(readiness.ready, 1);
        assert_eq!(samples, vec![(0, 1), (1, 1)]);
    }

    #[test]
    fn test_context_is_passed_first() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|spec| spec.args[..2] == ["--context", "og-cluster"] && spec.args[2] == "config")
            .returning(|_| Ok(CommandOutput::ok("og-cluster\n")));

        let kubectl = Kubectl::new(Arc::new(runner)).with_context("og-cluster");
        assert_eq!(kubectl.current_context().unwrap(), "og-cluster");
    }

    #[test]
    fn test_apply_manifest_uses_stdin() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|spec| spec.args == ["apply", "-f", "-"] && spec.stdin.as_deref() == Some("kind: Namespace\n"))
            .returning(|_| Ok(CommandOutput::ok("namespace/og configured")));

        let kubectl = Kubectl::new(Arc::new(runner));
        kubectl.apply_manifest("kind: Namespace\n").unwrap();
    }

    #[test]
    fn test_port_forward_returns_pid() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_spawn_detached()
            .withf(|spec| spec.args.last().map(String::as_str) == Some("8080:80"))
            .returning(|_| Ok(4242));

        let kubectl = Kubectl::new(Arc::new(runner));
        let pid = kubectl
            .port_forward("opengovernance", "svc/nginx-proxy", 8080, 80)
            .unwrap();
        assert_eq!(pid, 4242);
    }
}
