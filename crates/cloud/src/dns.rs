//! DNS checks through `dig +short`.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::exec::{run_checked, CommandError, CommandRunner, CommandSpec};
use crate::kubectl::LoadBalancerTarget;
use crate::poll::{poll_until, PollConfig, Probe};

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Resolves records with `dig`.
#[derive(Clone)]
pub struct DnsChecker {
    runner: Arc<dyn CommandRunner>,
}

impl DnsChecker {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Answers for `record_type`, trailing dots stripped.
    ///
    /// # Errors
    ///
    /// Returns an error if `dig` cannot run.
    pub fn lookup(&self, domain: &str, record_type: &str) -> Result<Vec<String>, CommandError> {
        let spec = CommandSpec::new("dig").args(["+short", domain, record_type]);
        let stdout = run_checked(self.runner.as_ref(), &spec)?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with(';'))
            .map(|l| l.trim_end_matches('.').to_string())
            .collect())
    }

    /// # Errors
    ///
    /// Returns an error if `dig` cannot run.
    pub fn cname(&self, domain: &str) -> Result<Option<String>, CommandError> {
        Ok(self.lookup(domain, "CNAME")?.into_iter().next())
    }

    /// A records; `dig` also prints the CNAME chain, which is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if `dig` cannot run.
    pub fn a_records(&self, domain: &str) -> Result<Vec<IpAddr>, CommandError> {
        Ok(self
            .lookup(domain, "A")?
            .iter()
            .filter_map(|l| l.parse().ok())
            .collect())
    }

    /// Whether `domain` already resolves to the load balancer.
    ///
    /// A hostname target matches on CNAME, or on shared A records when the
    /// domain is an apex alias.
    ///
    /// # Errors
    ///
    /// Returns an error if `dig` cannot run.
    pub fn points_to(&self, domain: &str, target: &LoadBalancerTarget) -> Result<bool, CommandError> {
        match target {
            LoadBalancerTarget::Hostname(host) => {
                if let Some(cname) = self.cname(domain)? {
                    if normalize(&cname) == normalize(host) {
                        return Ok(true);
                    }
                }
                let ours = self.a_records(domain)?;
                if ours.is_empty() {
                    return Ok(false);
                }
                let theirs = self.a_records(host)?;
                Ok(ours.iter().any(|ip| theirs.contains(ip)))
            }
            LoadBalancerTarget::Ip(ip) => {
                let Ok(expected) = ip.parse::<IpAddr>() else {
                    return Ok(false);
                };
                Ok(self.a_records(domain)?.contains(&expected))
            }
        }
    }

    /// Poll until `domain` resolves to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dig` fails or the budget runs out.
    pub async fn wait_for_dns(
        &self,
        domain: &str,
        target: &LoadBalancerTarget,
        poll: &PollConfig,
    ) -> anyhow::Result<()> {
        info!(domain, target = %target, "Waiting for DNS to propagate");
        poll_until(poll, &format!("{domain} to resolve to {target}"), |attempt| {
            if self.points_to(domain, target)? {
                Ok(Probe::Ready(()))
            } else {
                debug!(domain, attempt, "DNS not pointing at load balancer yet");
                Ok(Probe::Pending("not propagated".into()))
            }
        })
        .await
    }
}
