//! `helm` wrapper.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::exec::{run_checked, CommandError, CommandRunner, CommandSpec};

/// A release to install or upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmRelease {
    pub name: String,
    pub chart: String,
    pub namespace: String,
    pub version: Option<String>,
    pub values_file: Option<PathBuf>,
    /// `--set key=value` pairs, in order.
    pub set: Vec<(String, String)>,
    pub reuse_values: bool,
    pub create_namespace: bool,
    pub wait: bool,
    /// Passed to `--timeout`, e.g. `10m`.
    pub timeout: Option<String>,
}

impl HelmRelease {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        chart: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            chart: chart.into(),
            namespace: namespace.into(),
            version: None,
            values_file: None,
            set: Vec::new(),
            reuse_values: false,
            create_namespace: true,
            wait: false,
            timeout: None,
        }
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn values_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.values_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn reuse_values(mut self, reuse: bool) -> Self {
        self.reuse_values = reuse;
        self
    }

    #[must_use]
    pub fn create_namespace(mut self, create: bool) -> Self {
        self.create_namespace = create;
        self
    }

    #[must_use]
    pub fn wait(mut self, timeout: impl Into<String>) -> Self {
        self.wait = true;
        self.timeout = Some(timeout.into());
        self
    }

    /// Arguments for `helm upgrade --install`.
    #[must_use]
    pub fn upgrade_args(&self) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            self.name.clone(),
            self.chart.clone(),
            "--namespace".to_string(),
            self.namespace.clone(),
        ];

        if self.create_namespace {
            args.push("--create-namespace".into());
        }
        if let Some(version) = &self.version {
            args.extend(["--version".into(), version.clone()]);
        }
        if let Some(values) = &self.values_file {
            args.extend(["-f".into(), values.display().to_string()]);
        }
        if self.reuse_values {
            args.push("--reuse-values".into());
        }
        for (key, value) in &self.set {
            args.extend(["--set".into(), format!("{key}={value}")]);
        }
        if self.wait {
            args.push("--wait".into());
        }
        if let Some(timeout) = &self.timeout {
            args.extend(["--timeout".into(), timeout.clone()]);
        }
        args
    }
}

#[derive(Debug, Deserialize)]
struct StatusOutput {
    info: StatusInfo,
}

#[derive(Debug, Deserialize)]
struct StatusInfo {
    status: String,
}

/// `helm` CLI.
#[derive(Clone)]
pub struct Helm {
    runner: Arc<dyn CommandRunner>,
}

impl Helm {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn run<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Result<String, CommandError> {
        run_checked(self.runner.as_ref(), &CommandSpec::new("helm").args(args))
    }

    /// Add (or refresh) a chart repository.
    ///
    /// # Errors
    ///
    /// Returns an error if helm fails.
    pub fn repo_add(&self, name: &str, url: &str) -> Result<(), CommandError> {
        self.run(["repo", "add", name, url, "--force-update"])?;
        info!(repo = name, url, "Helm repository added");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if helm fails.
    pub fn repo_update(&self) -> Result<(), CommandError> {
        self.run(["repo", "update"]).map(|_| ())
    }

    /// `helm upgrade --install`.
    ///
    /// # Errors
    ///
    /// Returns an error if helm fails.
    pub fn upgrade_install(&self, release: &HelmRelease) -> Result<(), CommandError> {
        info!(
            release = %release.name,
            chart = %release.chart,
            namespace = %release.namespace,
            "Installing Helm release"
        );
        let spec = CommandSpec::new("helm").args(release.upgrade_args());
        run_checked(self.runner.as_ref(), &spec)?;
        Ok(())
    }

    /// Status string of a release (`deployed`, `failed`, ...), `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if helm fails for another reason or prints unparseable
    /// JSON.
    pub fn release_status(&self, name: &str, namespace: &str) -> anyhow::Result<Option<String>> {
        match self.run(["status", name, "-n", namespace, "-o", "json"]) {
            Ok(stdout) => {
                let parsed: StatusOutput = serde_json::from_str(&stdout)?;
                Ok(Some(parsed.info.status))
            }
            Err(CommandError::Failed { stderr, .. }) if stderr.contains("not found") => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{CommandOutput, MockCommandRunner};

    #[test]
    fn test_upgrade_args() {
        let release = HelmRelease::new("opengovernance", "opengovernance/opengovernance", "opengovernance")
            .values_file("/tmp/values.yaml")
            .set("global.domain", "demo.opengovernance.io")
            .wait("15m");

        assert_eq!(
            release.upgrade_args(),
            vec![
                "upgrade",
                "--install",
                "opengovernance",
                "opengovernance/opengovernance",
                "--namespace",
                "opengovernance",
                "--create-namespace",
                "-f",
                "/tmp/values.yaml",
                "--set",
                "global.domain=demo.opengovernance.io",
                "--wait",
                "--timeout",
                "15m",
            ]
        );
    }

    #[test]
    fn test_reuse_values_flag() {
        let args = HelmRelease::new("og", "og/og", "og")
            .reuse_values(true)
            .create_namespace(false)
            .upgrade_args();
        assert!(args.contains(&"--reuse-values".to_string()));
        assert!(!args.contains(&"--create-namespace".to_string()));
    }

    #[test]
    fn test_release_status_missing() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(CommandOutput::failed(1, "Error: release: not found")));

        let helm = Helm::new(Arc::new(runner));
        assert_eq!(helm.release_status("og", "og").unwrap(), None);
    }

    #[test]
    fn test_release_status_deployed() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_| {
            Ok(CommandOutput::ok(
                r#"{"name":"og","info":{"status":"deployed","description":"Install complete"}}"#,
            ))
        });

        let helm = Helm::new(Arc::new(runner));
        assert_eq!(
            helm.release_status("og", "og").unwrap().as_deref(),
            Some("deployed")
        );
    }
}
