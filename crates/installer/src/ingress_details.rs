//! `ingress_details.env`: what the post-install step needs to know.
//!
//! The file is valid POSIX shell (`. ./ingress_details.env` works) and is read
//! back by [`IngressDetails::load`] with the same quoting rules.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use og_cloud::CloudProvider;
use thiserror::Error;

use crate::config::{InstallConfig, InstallType};

/// Default file name, written to the output directory.
pub const FILE_NAME: &str = "ingress_details.env";

/// Errors reading or writing the details file.
#[derive(Debug, Error)]
pub enum IngressDetailsError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Missing required key {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Ingress facts recorded at the end of an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressDetails {
    pub provider: CloudProvider,
    pub install_type: InstallType,
    pub domain: Option<String>,
    pub certificate_arn: Option<String>,
    /// Load balancer hostname or IP.
    pub lb_dns: String,
    pub namespace: String,
    pub ingress_name: String,
    pub helm_release: String,
    pub helm_chart: String,
}

impl IngressDetails {
    /// Details for `config` once the load balancer is known.
    #[must_use]
    pub fn from_config(
        config: &InstallConfig,
        certificate_arn: Option<String>,
        lb_dns: impl Into<String>,
    ) -> Self {
        Self {
            provider: config.provider,
            install_type: config.install_type,
            domain: config.domain.clone(),
            certificate_arn,
            lb_dns: lb_dns.into(),
            namespace: config.namespace.clone(),
            ingress_name: config.ingress_name.clone(),
            helm_release: config.release.clone(),
            helm_chart: config.chart.clone(),
        }
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("PROVIDER", self.provider.to_string()),
            ("INSTALL_TYPE", self.install_type.to_string()),
            ("DOMAIN", self.domain.clone().unwrap_or_default()),
            ("CERTIFICATE_ARN", self.certificate_arn.clone().unwrap_or_default()),
            ("LB_DNS", self.lb_dns.clone()),
            ("NAMESPACE", self.namespace.clone()),
            ("INGRESS_NAME", self.ingress_name.clone()),
            ("HELM_RELEASE", self.helm_release.clone()),
            ("HELM_CHART", self.helm_chart.clone()),
        ]
    }

    /// Shell-sourceable file contents, one assignment per line.
    ///
    /// # Errors
    ///
    /// Returns [`IngressDetailsError::Invalid`] for a value spanning lines.
    pub fn render(&self) -> Result<String, IngressDetailsError> {
        let mut out = format!(
            "# Generated by og-install on {}\n",
            chrono::Utc::now().to_rfc3339()
        );
        for (key, value) in self.entries() {
            if value.contains(['\n', '\r']) {
                return Err(IngressDetailsError::Invalid { key, value });
            }
            let _ = writeln!(out, "{key}={}", shell_quote(&value));
        }
        Ok(out)
    }

    /// # Errors
    ///
    /// Returns an error if a value spans lines or the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), IngressDetailsError> {
        std::fs::write(path, self.render()?).map_err(|source| IngressDetailsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a required key is
    /// missing or malformed.
    pub fn load(path: &Path) -> Result<Self, IngressDetailsError> {
        let content = std::fs::read_to_string(path).map_err(|source| IngressDetailsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// # Errors
    ///
    /// Returns an error if a line is malformed or a required key is missing.
    pub fn parse(content: &str) -> Result<Self, IngressDetailsError> {
        let mut vars = parse_env(content)?;

        let mut take = |key: &'static str| vars.remove(key).filter(|v| !v.is_empty());
        let required = |value: Option<String>, key: &'static str| {
            value.ok_or(IngressDetailsError::Missing(key))
        };

        let provider = required(take("PROVIDER"), "PROVIDER")?;
        let provider = provider
            .parse()
            .map_err(|_| IngressDetailsError::Invalid {
                key: "PROVIDER",
                value: provider.clone(),
            })?;
        let install_type = required(take("INSTALL_TYPE"), "INSTALL_TYPE")?;
        let install_type = install_type
            .parse()
            .map_err(|_| IngressDetailsError::Invalid {
                key: "INSTALL_TYPE",
                value: install_type.clone(),
            })?;

        Ok(Self {
            provider,
            install_type,
            domain: take("DOMAIN"),
            certificate_arn: take("CERTIFICATE_ARN"),
            lb_dns: required(take("LB_DNS"), "LB_DNS")?,
            namespace: required(take("NAMESPACE"), "NAMESPACE")?,
            ingress_name: required(take("INGRESS_NAME"), "INGRESS_NAME")?,
            helm_release: required(take("HELM_RELEASE"), "HELM_RELEASE")?,
            helm_chart: required(take("HELM_CHART"), "HELM_CHART")?,
        })
    }
}

/// Single-quote `value` for POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Parse `KEY=value` lines with shell quoting.
///
/// Handles single quotes (literal), double quotes (backslash escapes `"`,
/// `\`, `$` and `` ` ``), backslash escapes in bare words, an optional
/// `export ` prefix, blank lines and `#` comments.
///
/// # Errors
///
/// Returns [`IngressDetailsError::Parse`] for a line without `=`, an invalid
/// key, or an unterminated quote.
pub fn parse_env(content: &str) -> Result<BTreeMap<String, String>, IngressDetailsError> {
    let mut vars = BTreeMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let (key, rest) = line.split_once('=').ok_or_else(|| IngressDetailsError::Parse {
            line: line_no,
            message: "expected KEY=value".to_string(),
        })?;

        let valid_key = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !key.starts_with(|c: char| c.is_ascii_digit());
        if !valid_key {
            return Err(IngressDetailsError::Parse {
                line: line_no,
                message: format!("invalid variable name '{key}'"),
            });
        }

        let value = unquote(rest).map_err(|message| IngressDetailsError::Parse {
            line: line_no,
            message,
        })?;
        vars.insert(key.to_string(), value);
    }

    Ok(vars)
}

fn unquote(input: &str) -> Result<String, String> {
    let mut out = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => loop {
                match chars.next() {
                    Some('\'') => break,
                    Some(ch) => out.push(ch),
                    None => return Err("unterminated single quote".to_string()),
                }
            },
            '"' => loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(ch @ ('"' | '\\' | '$' | '`')) => out.push(ch),
                        Some('\n') => {}
                        Some(ch) => {
                            out.push('\\');
                            out.push(ch);
                        }
                        None => return Err("unterminated double quote".to_string()),
                    },
                    Some(ch) => out.push(ch),
                    None => return Err("unterminated double quote".to_string()),
                }
            },
            '\\' => {
                if let Some(ch) = chars.next() {
                    out.push(ch);
                }
            }
            // Unquoted whitespace ends the value; the rest is a comment or junk.
            c if c.is_whitespace() => break,
            c => out.push(c),
        }
    }

    Ok(out)
}
