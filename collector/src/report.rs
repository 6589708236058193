//! Serializable summary of a polling cycle.

use serde::{Deserialize, Serialize};
use smcipmi_exporter_core::{ErrorMarker, ExtractionOutcome, Observation};

use crate::error::AcquisitionCode;
use crate::poll::{CycleOutcome, TargetOutcome};

/// Acquisition failure details for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionReport {
    pub code: AcquisitionCode,
    pub message: String,
}

/// Per-target section of a [`CycleReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub success: bool,
    pub elapsed_ms: u64,
    pub modules: usize,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub errors: Vec<ErrorMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition_error: Option<AcquisitionReport>,
}

impl TargetReport {
    /// Builds a report from an offline extraction with no acquisition step.
    pub fn from_extraction(outcome: &ExtractionOutcome) -> Self {
        Self {
            target: outcome.target.clone(),
            success: !outcome.has_errors(),
            elapsed_ms: 0,
            modules: outcome.modules,
            observations: outcome.observations().cloned().collect(),
            errors: outcome.errors().cloned().collect(),
            acquisition_error: None,
        }
    }

    pub fn from_outcome(outcome: &TargetOutcome) -> Self {
        let elapsed_ms = outcome.elapsed.as_millis() as u64;
        match &outcome.result {
            Ok(extraction) => Self {
                elapsed_ms,
                ..Self::from_extraction(extraction)
            },
            Err(err) => Self {
                target: outcome.target.clone(),
                success: false,
                elapsed_ms,
                modules: 0,
                observations: Vec::new(),
                errors: Vec::new(),
                acquisition_error: Some(AcquisitionReport {
                    code: err.code(),
                    message: err.to_string(),
                }),
            },
        }
    }
}

/// Summary of one cycle, suitable for JSON, YAML and table output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub generated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
    pub total_targets: usize,
    pub failed_targets: usize,
    pub total_observations: usize,
    pub targets: Vec<TargetReport>,
}

impl CycleReport {
    pub fn new(collector: Option<&str>, targets: Vec<TargetReport>) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            collector: collector.map(str::to_string),
            total_targets: targets.len(),
            failed_targets: targets.iter().filter(|t| !t.success).count(),
            total_observations: targets.iter().map(|t| t.observations.len()).sum(),
            targets,
        }
    }

    pub fn from_cycle(cycle: &CycleOutcome) -> Self {
        Self::new(
            cycle.collector,
            cycle.targets.iter().map(TargetReport::from_outcome).collect(),
        )
    }
}
