//! Prometheus text exposition of polling results.
//!
//! A fresh [`Exposition`] is built for every scrape, so series for targets
//! or modules that disappeared are never carried over.

use std::collections::HashMap;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use smcipmi_exporter_core::{ExtractionOutcome, METRIC_LABELS, MetricCatalog, NAMESPACE, fq_name};
use tracing::debug;

use crate::error::Result;
use crate::poll::CycleOutcome;

/// Content type of [`Exposition::encode`] output.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

const COLLECTOR_ERROR_LABELS: [&str; 2] = ["name", "target"];

/// Registry with one gauge family per catalog definition plus
/// `smcipmi_collector_error`.
pub struct Exposition {
    registry: Registry,
    gauges: HashMap<String, GaugeVec>,
    collector_error: GaugeVec,
}

impl Exposition {
    /// Registers gauges for every definition in `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`Metrics`](crate::CollectorError::Metrics) if a metric name
    /// is invalid or registered twice.
    pub fn new(catalog: &MetricCatalog) -> Result<Self> {
        let registry = Registry::new();
        let mut gauges = HashMap::with_capacity(catalog.len());

        for definition in catalog.definitions() {
            let identity = &definition.identity;
            let gauge = GaugeVec::new(Opts::new(&identity.name, &identity.help), &METRIC_LABELS)?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(identity.name.clone(), gauge);
        }

        let collector_error = GaugeVec::new(
            Opts::new(
                fq_name("collector", "error"),
                "Set to 1 when a collector failed to acquire or convert data for a target",
            ),
            &COLLECTOR_ERROR_LABELS,
        )?;
        registry.register(Box::new(collector_error.clone()))?;

        Ok(Self {
            registry,
            gauges,
            collector_error,
        })
    }

    /// Sets a gauge for every observation and flags the collector when the
    /// outcome carries error markers.
    pub fn record_extraction(&self, collector: &str, outcome: &ExtractionOutcome) {
        for observation in outcome.observations() {
            let Some(gauge) = self.gauges.get(&observation.identity.name) else {
                debug!(metric = %observation.identity.name, "Observation has no registered gauge");
                continue;
            };
            gauge
                .with_label_values(&observation.labels.values())
                .set(observation.value);
        }
        if outcome.has_errors() {
            self.mark_failed(collector, &outcome.target);
        }
    }

    /// Sets `smcipmi_collector_error{name, target}` to 1.
    ///
    /// Repeated calls for the same pair keep a single series.
    pub fn mark_failed(&self, collector: &str, target: &str) {
        self.collector_error
            .with_label_values(&[collector, target])
            .set(1.0);
    }

    /// Records every target of a polling cycle.
    pub fn record_cycle(&self, cycle: &CycleOutcome) {
        let Some(collector) = cycle.collector else {
            return;
        };
        for target in &cycle.targets {
            match &target.result {
                Ok(outcome) => self.record_extraction(collector, outcome),
                Err(_) => self.mark_failed(collector, &target.target),
            }
        }
    }

    /// Renders all registered families in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for Exposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exposition")
            .field("namespace", &NAMESPACE)
            .field("gauges", &self.gauges.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Renders one cycle as Prometheus text.
pub fn render_prometheus(catalog: &MetricCatalog, cycle: &CycleOutcome) -> Result<String> {
    let exposition = Exposition::new(catalog)?;
    exposition.record_cycle(cycle);
    exposition.encode()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use smcipmi_exporter_core::assemble;

    use super::*;
    use crate::error::AcquisitionError;
    use crate::poll::TargetOutcome;

    fn target(name: &str, raw: &str) -> TargetOutcome {
        TargetOutcome {
            target: name.into(),
            result: Ok(assemble(name, raw, &MetricCatalog::standard())),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_renders_observations_with_labels() {
        let cycle = CycleOutcome {
            collector: Some("pminfo"),
            targets: vec![target(
                "bmc-a",
                "[Module 1]\nStatus | [STATUS OK]\nInput Power | 198 W\n\n[Module 2]\nStatus | [UNIT IS OFF]\n",
            )],
        };
        let text = render_prometheus(&MetricCatalog::standard(), &cycle).unwrap();

        assert!(text.contains("# HELP smcipmi_pminfo_power_consumption_watts Current power consumption measured in watts"));
        assert!(text.contains("# TYPE smcipmi_pminfo_power_supply_status gauge"));
        assert!(text.contains("smcipmi_pminfo_power_consumption_watts{module=\"1\",target=\"bmc-a\"} 198"));
        assert!(text.contains("smcipmi_pminfo_power_supply_status{module=\"1\",target=\"bmc-a\"} 0"));
        assert!(text.contains("smcipmi_pminfo_power_supply_status{module=\"2\",target=\"bmc-a\"} 1"));
        assert!(!text.contains("smcipmi_pminfo_power_consumption_watts{module=\"2\""));
        assert!(!text.contains("smcipmi_collector_error"));
    }

    #[test]
    fn test_collector_error_is_emitted_once_per_target() {
        let cycle = CycleOutcome {
            collector: Some("pminfo"),
            targets: vec![
                target("bmc-a", "[Module 1]\nStatus | ???\nInput Power | N/A\n\n[Module 2]\n"),
                TargetOutcome {
                    target: "bmc-b".into(),
                    result: Err(AcquisitionError::Timeout {
                        program: "SMCIPMITool".into(),
                        timeout_ms: 30_000,
                    }),
                    elapsed: Duration::ZERO,
                },
                target("bmc-c", "[Module 1]\nStatus | OK\n"),
            ],
        };
        let text = render_prometheus(&MetricCatalog::standard(), &cycle).unwrap();

        let error_lines: Vec<&str> = text
            .lines()
            .filter(|line| line.starts_with("smcipmi_collector_error{"))
            .collect();
        assert_eq!(
            error_lines,
            [
                "smcipmi_collector_error{name=\"pminfo\",target=\"bmc-a\"} 1",
                "smcipmi_collector_error{name=\"pminfo\",target=\"bmc-b\"} 1",
            ]
        );
        assert!(text.contains("smcipmi_pminfo_power_supply_status{module=\"1\",target=\"bmc-c\"} 0"));
    }

    #[test]
    fn test_empty_cycle_renders_nothing() {
        let text = render_prometheus(&MetricCatalog::standard(), &CycleOutcome::default()).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_readings_catalog_registers_extra_families() {
        let catalog = MetricCatalog::with_electrical_readings();
        let exposition = Exposition::new(&catalog).unwrap();
        let outcome = assemble("bmc-a", "[Module 1]\nInput Current | 0.96 A\n", &catalog);
        exposition.record_extraction("pminfo", &outcome);

        let text = exposition.encode().unwrap();
        assert!(text.contains("smcipmi_pminfo_input_current_amperes{module=\"1\",target=\"bmc-a\"} 0.96"));
        assert_eq!(CONTENT_TYPE, "text/plain; version=0.0.4");
    }
}
