//! Error types for collection, configuration and exposition.
//!
//! [`CollectorError`] covers setup problems that stop the exporter from
//! running at all. [`AcquisitionError`] describes why one target's
//! `pminfo` output could not be obtained; it only affects that target.

use serde::{Deserialize, Serialize};
use smcipmi_exporter_core::PatternError;
use thiserror::Error;

/// Errors that can occur while setting up or running the collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The configuration file parsed but failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Custom module header pattern was rejected.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// Metric registration or encoding failure.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// The polling thread pool could not be created.
    #[error("failed to build polling thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Convenience alias for results with [`CollectorError`].
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Structured failure code for acquisition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionCode {
    NotInstalled,
    PermissionBlocked,
    SpawnFailed,
    Timeout,
    NonZeroExit,
    ReadFailed,
}

impl std::fmt::Display for AcquisitionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInstalled => write!(f, "not_installed"),
            Self::PermissionBlocked => write!(f, "permission_blocked"),
            Self::SpawnFailed => write!(f, "spawn_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::NonZeroExit => write!(f, "non_zero_exit"),
            Self::ReadFailed => write!(f, "read_failed"),
        }
    }
}

/// Why the raw `pminfo` text for a target could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("command not found: {program}")]
    NotInstalled { program: String },

    #[error("permission denied running {program}")]
    PermissionBlocked { program: String },

    #[error("failed to spawn {program}: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("{program} timed out after {timeout_ms} ms")]
    Timeout { program: String, timeout_ms: u64 },

    #[error("{program} exited with {status}{}", stderr_suffix(.stderr))]
    NonZeroExit {
        program: String,
        status: String,
        stderr: Option<String>,
    },

    #[error("failed to collect output of {program}: {message}")]
    ReadFailed { program: String, message: String },
}

impl AcquisitionError {
    pub fn code(&self) -> AcquisitionCode {
        match self {
            Self::NotInstalled { .. } => AcquisitionCode::NotInstalled,
            Self::PermissionBlocked { .. } => AcquisitionCode::PermissionBlocked,
            Self::SpawnFailed { .. } => AcquisitionCode::SpawnFailed,
            Self::Timeout { .. } => AcquisitionCode::Timeout,
            Self::NonZeroExit { .. } => AcquisitionCode::NonZeroExit,
            Self::ReadFailed { .. } => AcquisitionCode::ReadFailed,
        }
    }
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    stderr
        .as_deref()
        .map(|text| format!(": {text}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_code_display_matches_serde() {
        let codes = [
            (AcquisitionCode::NotInstalled, "not_installed"),
            (AcquisitionCode::PermissionBlocked, "permission_blocked"),
            (AcquisitionCode::SpawnFailed, "spawn_failed"),
            (AcquisitionCode::Timeout, "timeout"),
            (AcquisitionCode::NonZeroExit, "non_zero_exit"),
            (AcquisitionCode::ReadFailed, "read_failed"),
        ];

        for (code, expected) in codes {
            assert_eq!(code.to_string(), expected);
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{expected}\""));
        }
    }

    #[test]
    fn test_non_zero_exit_message_includes_stderr_when_present() {
        let with_stderr = AcquisitionError::NonZeroExit {
            program: "SMCIPMITool".into(),
            status: "exit status: 1".into(),
            stderr: Some("Login failed".into()),
        };
        assert_eq!(
            with_stderr.to_string(),
            "SMCIPMITool exited with exit status: 1: Login failed"
        );

        let without = AcquisitionError::NonZeroExit {
            program: "SMCIPMITool".into(),
            status: "exit status: 2".into(),
            stderr: None,
        };
        assert_eq!(without.to_string(), "SMCIPMITool exited with exit status: 2");
        assert_eq!(without.code(), AcquisitionCode::NonZeroExit);
    }
}
