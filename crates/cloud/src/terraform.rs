//! Terraform / OpenTofu runner.
//!
//! Both binaries accept the same flags, so the one found first on `PATH`
//! is used for the whole run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::exec::{run_checked, CommandError, CommandRunner, CommandSpec};
use crate::tools::{self, ResolvedTool};

/// One entry of `terraform output -json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TerraformOutput {
    pub value: serde_json::Value,
    #[serde(default)]
    pub sensitive: bool,
}

/// A Terraform working directory.
#[derive(Clone)]
pub struct Terraform {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    dir: PathBuf,
}

impl Terraform {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            dir: dir.into(),
        }
    }

    /// Use `terraform` if installed, otherwise `tofu`.
    ///
    /// # Errors
    ///
    /// Returns an error naming `terraform/tofu` when neither is installed.
    pub fn detect(
        runner: Arc<dyn CommandRunner>,
        dir: impl Into<PathBuf>,
    ) -> Result<Self, tools::MissingTools> {
        let resolved: Vec<ResolvedTool> =
            tools::check_requirements(&[tools::TERRAFORM], tools::which_lookup)?;
        let binary = resolved
            .first()
            .map_or(tools::TERRAFORM.candidates[0], |t| t.binary);
        Ok(Self::new(runner, binary, dir))
    }

    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn command<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        CommandSpec::new(self.binary.as_str())
            .arg(format!("-chdir={}", self.dir.display()))
            .args(args)
            .env("TF_IN_AUTOMATION", "1")
    }

    /// # Errors
    ///
    /// Returns an error if init fails.
    pub fn init(&self) -> Result<(), CommandError> {
        info!(binary = %self.binary, dir = %self.dir.display(), "Initializing infrastructure");
        run_checked(self.runner.as_ref(), &self.command(["init", "-input=false"]))?;
        Ok(())
    }

    /// `apply -auto-approve` with `-var` overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if apply fails.
    pub fn apply(&self, vars: &BTreeMap<String, String>) -> Result<(), CommandError> {
        info!(dir = %self.dir.display(), "Applying infrastructure");
        let mut spec = self.command(["apply", "-auto-approve", "-input=false"]);
        for (key, value) in vars {
            spec = spec.arg("-var").arg(format!("{key}={value}"));
        }
        run_checked(self.runner.as_ref(), &spec)?;
        Ok(())
    }

    /// Parsed `output -json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or prints invalid JSON.
    pub fn outputs(&self) -> anyhow::Result<BTreeMap<String, TerraformOutput>> {
        let stdout = run_checked(self.runner.as_ref(), &self.command(["output", "-json"]))?;
        Ok(serde_json::from_str(&stdout)?)
    }

    /// A string output, `None` when missing or not a string.
    ///
    /// # Errors
    ///
    /// Returns an error if outputs cannot be read.
    pub fn output_string(&self, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .outputs()?
            .remove(name)
            .and_then(|o| o.value.as_str().map(str::to_string)))
    }
}
