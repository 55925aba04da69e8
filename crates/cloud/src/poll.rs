//! Bounded fixed-interval polling.
//!
//! Certificates, load balancers, pods, DNS records and clusters are all waited
//! on the same way: probe, sleep a fixed interval, give up after a fixed
//! number of attempts.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Attempt budget and interval for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of probes.
    pub max_attempts: u32,
    /// Sleep between consecutive probes.
    pub interval: Duration,
}

impl PollConfig {
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// `max_attempts` probes `interval_secs` apart.
    #[must_use]
    pub const fn fixed(max_attempts: u32, interval_secs: u64) -> Self {
        Self::new(max_attempts, Duration::from_secs(interval_secs))
    }

    /// Upper bound on the time spent sleeping.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The condition holds; stop polling.
    Ready(T),
    /// Not there yet; the string describes the observed state.
    Pending(String),
}

/// The attempt budget ran out before the condition held.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Timed out waiting for {what} after {attempts} attempts{}", last_seen(.last_status))]
pub struct PollExhausted {
    pub what: String,
    pub attempts: u32,
    pub last_status: Option<String>,
}

fn last_seen(status: &Option<String>) -> String {
    status
        .as_deref()
        .map(|s| format!(" (last status: {s})"))
        .unwrap_or_default()
}

/// Probe until ready, an error, or `config.max_attempts` probes.
///
/// The probe receives the 1-based attempt number. No sleep happens after the
/// final attempt, so an exhausted loop costs exactly `max_attempts` probes.
///
/// # Errors
///
/// Propagates the first probe error, or returns [`PollExhausted`] converted
/// into `E` once the budget is spent.
pub async fn poll_until<T, E, F>(config: &PollConfig, what: &str, mut probe: F) -> Result<T, E>
where
    F: FnMut(u32) -> Result<Probe<T>, E>,
    E: From<PollExhausted>,
{
    let mut last_status = None;

    for attempt in 1..=config.max_attempts {
        match probe(attempt)? {
            Probe::Ready(value) => {
                debug!(what, attempt, "Condition met");
                return Ok(value);
            }
            Probe::Pending(status) => {
                debug!(
                    what,
                    attempt,
                    max_attempts = config.max_attempts,
                    status = %status,
                    "Still waiting"
                );
                last_status = Some(status);
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    Err(PollExhausted {
        what: what.to_string(),
        attempts: config.max_attempts,
        last_status,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: PollConfig = PollConfig::new(4, Duration::ZERO);

    #[tokio::test]
    async fn test_ready_on_first_probe() {
        let mut calls = 0;
        let value: Result<&str, PollExhausted> = poll_until(&FAST, "thing", |_| {
            calls += 1;
            Ok(Probe::Ready("done"))
        })
        .await;

        assert_eq!(value.unwrap(), "done");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_exhausts_after_exact_budget() {
        let mut seen = Vec::new();
        let result: Result<(), PollExhausted> = poll_until(&FAST, "load balancer", |attempt| {
            seen.push(attempt);
            Ok(Probe::Pending("pending".into()))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last_status.as_deref(), Some("pending"));
        assert!(err.to_string().contains("load balancer"));
    }

    #[tokio::test]
    async fn test_probe_error_stops_immediately() {
        let mut calls = 0;
        let result: Result<(), anyhow::Error> = poll_until(&FAST, "pods", |_| {
            calls += 1;
            Err(anyhow::anyhow!("kubectl exploded"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_budget() {
        assert_eq!(PollConfig::fixed(60, 30).budget(), Duration::from_secs(59 * 30));
        assert_eq!(PollConfig::fixed(0, 30).budget(), Duration::ZERO);
    }
}
