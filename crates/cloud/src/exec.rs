//! Vendor CLI execution.
//!
//! All cloud and Kubernetes APIs are driven through their CLIs. The
//! [`CommandRunner`] trait is the seam between the installer and those
//! processes, which lets polling logic be exercised against scripted output.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

/// Errors raised while running a vendor CLI.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The binary is not on `PATH`.
    #[error("{program} not found on PATH")]
    NotFound { program: String },

    /// The process could not be started or its pipes failed.
    #[error("Failed to execute {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited non-zero.
    #[error("`{command}` failed ({}): {stderr}", describe_code(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"))
}

/// A command line to execute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Binary name, resolved through `PATH`.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Data written to the child's stdin.
    pub stdin: Option<String>,
}

impl CommandSpec {
    /// Start a command for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Pipe `input` into the child's stdin.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run printing `stdout`.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes vendor CLIs.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output.
    ///
    /// A non-zero exit is not an error at this level; see [`run_checked`].
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Start a long-running process in the background and return its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    fn spawn_detached(&self, spec: &CommandSpec) -> Result<u32, CommandError>;
}

/// Run a command and return its stdout, failing on a non-zero exit.
///
/// # Errors
///
/// Returns [`CommandError::Failed`] when the process exits non-zero.
pub fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<String, CommandError> {
    let output = runner.run(spec)?;
    if output.success() {
        Ok(output.stdout)
    } else {
        Err(CommandError::Failed {
            command: spec.to_string(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// [`CommandRunner`] backed by real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> CommandError {
    if err.kind() == ErrorKind::NotFound {
        CommandError::NotFound {
            program: program.to_string(),
        }
    } else {
        CommandError::Io {
            program: program.to_string(),
            source: err,
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!(command = %spec, "Running command");

        let mut cmd = Self::command(spec);
        let output = if let Some(input) = &spec.stdin {
            let mut child = cmd
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| spawn_error(&spec.program, e))?;

            // Dropping the handle closes stdin so the child sees EOF.
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .map_err(|source| CommandError::Io {
                        program: spec.program.clone(),
                        source,
                    })?;
            }

            child.wait_with_output()
        } else {
            cmd.output()
        }
        .map_err(|e| spawn_error(&spec.program, e))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn_detached(&self, spec: &CommandSpec) -> Result<u32, CommandError> {
        debug!(command = %spec, "Spawning background command");

        let child = Self::command(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&spec.program, e))?;

        Ok(child.id())
    }
}
