//! Output formatting for polling cycles.

use smcipmi_exporter_core::MetricCatalog;

use crate::exposition::render_prometheus;
use crate::poll::CycleOutcome;
use crate::report::{CycleReport, TargetReport};

/// Supported output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    /// Prometheus text exposition, as served on `/metrics`.
    #[default]
    Prometheus,
    Json,
    Yaml,
    Table,
}

/// Formats a cycle in the requested output format.
pub fn format_cycle(
    catalog: &MetricCatalog,
    cycle: &CycleOutcome,
    format: OutputFormat,
) -> Result<String, String> {
    match format {
        OutputFormat::Prometheus => render_prometheus(catalog, cycle)
            .map_err(|e| format!("Prometheus encoding failed: {e}")),
        OutputFormat::Json => format_report(&CycleReport::from_cycle(cycle), format),
        OutputFormat::Yaml => format_report(&CycleReport::from_cycle(cycle), format),
        OutputFormat::Table => Ok(cycle_to_table(&CycleReport::from_cycle(cycle))),
    }
}

/// Formats a cycle report. Prometheus output needs the metric catalog, so
/// it is only available through [`format_cycle`].
pub fn format_report(report: &CycleReport, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| format!("JSON serialization failed: {e}")),
        OutputFormat::Yaml => {
            serde_yaml::to_string(report).map_err(|e| format!("YAML serialization failed: {e}"))
        }
        OutputFormat::Table => Ok(cycle_to_table(report)),
        OutputFormat::Prometheus => {
            Err("prometheus output requires a polling cycle, not a report".to_string())
        }
    }
}

fn cycle_to_table(report: &CycleReport) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Targets: {}  Failed: {}  Observations: {}\n",
        report.total_targets, report.failed_targets, report.total_observations
    ));

    for target in &report.targets {
        out.push('\n');
        out.push_str(&target_to_table(target));
    }

    out
}

fn target_to_table(target: &TargetReport) -> String {
    let mut out = String::new();
    let state = if target.success { "ok" } else { "FAILED" };
    out.push_str(&format!(
        "{}  [{state}]  modules: {}  {} ms\n",
        target.target, target.modules, target.elapsed_ms
    ));

    if let Some(ref acquisition) = target.acquisition_error {
        out.push_str(&format!("  {}: {}\n", acquisition.code, acquisition.message));
        return out;
    }

    let max_name = target
        .observations
        .iter()
        .map(|o| o.identity.name.len())
        .max()
        .unwrap_or(6);
    for observation in &target.observations {
        out.push_str(&format!(
            "  {:>6}  {:<width$}  {}\n",
            observation.labels.module,
            observation.identity.name,
            observation.value,
            width = max_name
        ));
    }

    for marker in &target.errors {
        let metric = marker.metric.as_deref().unwrap_or("-");
        out.push_str(&format!(
            "  {:>6}  {metric}  error: {}\n",
            marker.labels.module, marker.failure
        ));
    }

    out
}
