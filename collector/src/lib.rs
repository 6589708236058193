//! Polling and exposition for the SMCIPMITool power-supply exporter.
//!
//! This crate wires the extraction engine in `smcipmi-exporter-core` to the
//! outside world:
//!
//! - [`ExporterConfig`] loads the YAML configuration.
//! - [`SmcIpmiTool`] runs the vendor binary behind the [`ReportSource`] trait.
//! - [`Poller`] polls every target in parallel and assembles the records.
//! - [`Exposition`] renders a cycle in the Prometheus text format, and
//!   [`format_cycle`] provides JSON, YAML and table views.

pub mod config;
pub mod error;
pub mod exposition;
pub mod output;
pub mod poll;
pub mod report;
pub mod tool;

pub use config::{
    CollectorsConfig, ConfigIssue, DEFAULT_CONFIG_FILE, ExporterConfig, Login, ToolConfig,
};
pub use error::{AcquisitionCode, AcquisitionError, CollectorError, Result};
pub use exposition::{CONTENT_TYPE, Exposition, render_prometheus};
pub use output::{OutputFormat, format_cycle, format_report};
pub use poll::{CycleOutcome, PMINFO_COLLECTOR, Poller, TargetOutcome};
pub use report::{AcquisitionReport, CycleReport, TargetReport};
pub use tool::{ReportSource, SmcIpmiTool};
