//! Exporter configuration.
//!
//! Defines the YAML file that lists the BMC targets to poll, the shared
//! login, which collectors are enabled and how the `SMCIPMITool` binary is
//! invoked.
//!
//! # Example YAML
//!
//! ```yaml
//! targets:
//!   - bmc-node01
//!   - bmc-node02
//! login:
//!   user: ADMIN
//!   password: secret
//! collectors:
//!   pminfo: true
//!   pminfo_readings: false
//! tool:
//!   command: SMCIPMITool
//!   sudo: false
//!   timeout_secs: 30
//! jobs: 4
//! ```

use std::fmt;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smcipmi_exporter_core::{MetricCatalog, PatternError, Segmenter};
use thiserror::Error;

use crate::error::{CollectorError, Result};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Program name used when the `tool` section is omitted.
pub const DEFAULT_TOOL_COMMAND: &str = "SMCIPMITool";

/// Acquisition timeout used when the `tool` section is omitted.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Credentials passed to `SMCIPMITool` for every target.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Which collectors run on each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectorsConfig {
    /// Power-supply status and consumption.
    pub pminfo: bool,
    /// Output power, input voltage and input current in addition to `pminfo`.
    #[serde(default)]
    pub pminfo_readings: bool,
}

/// How the `SMCIPMITool` binary is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Program name or path.
    pub command: String,
    /// Prefix the invocation with `sudo`.
    pub sudo: bool,
    /// Seconds to wait before the tool is killed.
    pub timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_TOOL_COMMAND.to_string(),
            sudo: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A problem found by [`ExporterConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    #[error("no targets configured")]
    NoTargets,

    #[error("target #{0} is blank")]
    BlankTarget(usize),

    #[error("target '{0}' is listed more than once")]
    DuplicateTarget(String),

    #[error("login.user is empty")]
    EmptyUser,

    #[error("login.password is empty")]
    EmptyPassword,

    #[error("tool.command is empty")]
    EmptyCommand,

    #[error("tool.timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("jobs must be greater than zero")]
    ZeroJobs,

    #[error("module_pattern: {0}")]
    ModulePattern(String),
}

/// Top-level exporter configuration.
///
/// # Examples
///
/// ```
/// use smcipmi_exporter_collector::ExporterConfig;
///
/// let config = ExporterConfig::from_yaml_str(
///     "targets: [bmc-node01]\nlogin: {user: ADMIN, password: secret}\ncollectors: {pminfo: true}\n",
/// )
/// .unwrap();
/// assert!(config.validate().is_empty());
/// assert_eq!(config.tool.command, "SMCIPMITool");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// BMC hosts, polled in this order.
    pub targets: Vec<String>,
    pub login: Login,
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub tool: ToolConfig,
    /// Number of targets polled in parallel. Defaults to the CPU count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    /// Custom module header regex; must define an `index` group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_pattern: Option<String>,
}

impl ExporterConfig {
    /// Loads configuration from a YAML file without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](CollectorError::IoError) if the file cannot be
    /// read, or [`YamlError`](CollectorError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Parses configuration from a YAML string without validating it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads and validates, folding every issue into one error.
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::load(path)?;
        let issues = config.validate();
        if issues.is_empty() {
            return Ok(config);
        }
        let joined = issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(CollectorError::InvalidConfig(joined))
    }

    /// Returns every problem with the configuration. Empty means valid.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.targets.is_empty() {
            issues.push(ConfigIssue::NoTargets);
        }
        let mut seen = std::collections::HashSet::new();
        for (position, target) in self.targets.iter().enumerate() {
            let trimmed = target.trim();
            if trimmed.is_empty() {
                issues.push(ConfigIssue::BlankTarget(position + 1));
            } else if !seen.insert(trimmed) {
                issues.push(ConfigIssue::DuplicateTarget(trimmed.to_string()));
            }
        }

        if self.login.user.trim().is_empty() {
            issues.push(ConfigIssue::EmptyUser);
        }
        if self.login.password.is_empty() {
            issues.push(ConfigIssue::EmptyPassword);
        }
        if self.tool.command.trim().is_empty() {
            issues.push(ConfigIssue::EmptyCommand);
        }
        if self.tool.timeout_secs == 0 {
            issues.push(ConfigIssue::ZeroTimeout);
        }
        if self.jobs == Some(0) {
            issues.push(ConfigIssue::ZeroJobs);
        }
        if let Err(err) = self.segmenter() {
            issues.push(ConfigIssue::ModulePattern(err.to_string()));
        }

        issues
    }

    /// Metric definitions enabled by the `collectors` section.
    pub fn catalog(&self) -> MetricCatalog {
        if self.collectors.pminfo_readings {
            MetricCatalog::with_electrical_readings()
        } else {
            MetricCatalog::standard()
        }
    }

    /// Segmenter for `module_pattern`, or the default one.
    pub fn segmenter(&self) -> std::result::Result<Segmenter, PatternError> {
        match self.module_pattern.as_deref() {
            Some(pattern) => Segmenter::with_pattern(pattern),
            None => Ok(Segmenter::default()),
        }
    }
}
