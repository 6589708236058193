//! Per-report orchestration: segment, extract, resolve, convert.

use tracing::{debug, warn};

use crate::catalog::{MetricCatalog, lookup};
use crate::convert::{ConversionFailure, FailureKind};
use crate::fields::extract_fields;
use crate::segment::Segmenter;
use crate::types::{ErrorMarker, ExtractionOutcome, Labels, MetricRecord, ModuleBlock, Observation};

/// Runs the extraction pipeline with a fixed catalog and segmenter.
///
/// The assembler holds no mutable state, so one instance can serve any
/// number of targets concurrently.
///
/// # Examples
///
/// ```
/// use smcipmi_exporter_core::{Assembler, MetricCatalog};
///
/// let catalog = MetricCatalog::standard();
/// let assembler = Assembler::new(&catalog);
///
/// let raw = "[Module 1]\nStatus | Power Supply OK\nInput Power | 42 W\n";
/// let outcome = assembler.assemble("node01", raw);
///
/// assert_eq!(outcome.modules, 1);
/// let power = outcome.find("smcipmi_pminfo_power_consumption_watts", "1").unwrap();
/// assert_eq!(power.value, 42.0);
/// ```
#[derive(Debug, Clone)]
pub struct Assembler<'a> {
    catalog: &'a MetricCatalog,
    segmenter: Segmenter,
}

impl<'a> Assembler<'a> {
    /// Creates an assembler using the default module header pattern.
    pub fn new(catalog: &'a MetricCatalog) -> Self {
        Self {
            catalog,
            segmenter: Segmenter::default(),
        }
    }

    /// Replaces the segmenter.
    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn catalog(&self) -> &MetricCatalog {
        self.catalog
    }

    /// Converts one raw report into records for `target`.
    ///
    /// Fields missing from a module are skipped. Values that fail
    /// conversion become [`ErrorMarker`]s and do not stop the remaining
    /// definitions or modules.
    pub fn assemble(&self, target: &str, raw: &str) -> ExtractionOutcome {
        let blocks = self.segmenter.segment(raw);
        if blocks.is_empty() && !raw.trim().is_empty() {
            debug!(host = %target, "No module sections found in report");
        }

        let mut outcome = ExtractionOutcome::empty(target);
        outcome.modules = blocks.len();
        for block in &blocks {
            self.resolve_module(target, block, &mut outcome.records);
        }
        outcome
    }

    fn resolve_module(&self, target: &str, block: &ModuleBlock, records: &mut Vec<MetricRecord>) {
        let labels = Labels::new(target, block.index.as_str());
        let fields = extract_fields(&block.body);
        debug!(host = %target, module = %block.index, fields = fields.len(), "Extracted module fields");

        if fields.is_empty() {
            warn!(host = %target, module = %block.index, "Module section contains no fields");
            records.push(MetricRecord::Error(ErrorMarker {
                labels,
                metric: None,
                failure: ConversionFailure::new(FailureKind::MalformedSection, block.body.trim()),
            }));
            return;
        }

        for definition in self.catalog.definitions() {
            let Some(raw_value) = lookup(&fields, definition) else {
                debug!(
                    host = %target,
                    module = %block.index,
                    field = %definition.canonical_name,
                    "Field not present in module"
                );
                continue;
            };

            match definition.convert(raw_value) {
                Ok(value) => records.push(MetricRecord::Observation(Observation {
                    identity: definition.identity.clone(),
                    kind: definition.kind,
                    labels: labels.clone(),
                    value,
                })),
                Err(failure) => {
                    warn!(
                        host = %target,
                        module = %block.index,
                        metric = %definition.identity.name,
                        error = %failure,
                        "Failed to convert field value"
                    );
                    records.push(MetricRecord::Error(ErrorMarker {
                        labels: labels.clone(),
                        metric: Some(definition.identity.name.clone()),
                        failure,
                    }));
                }
            }
        }
    }
}

/// Runs the pipeline once with the default segmenter.
pub fn assemble(target: &str, raw: &str, catalog: &MetricCatalog) -> ExtractionOutcome {
    Assembler::new(catalog).assemble(target, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "smcipmi_pminfo_power_supply_status";
    const POWER: &str = "smcipmi_pminfo_power_consumption_watts";

    #[test]
    fn test_two_module_scenario() {
        let raw = "[Module 1]\nStatus | Power Supply OK\nInput Power | 42 W\n\n[Module 2]\nStatus | [UNIT IS OFF] (40h)\n";
        let outcome = assemble("node01", raw, &MetricCatalog::standard());

        assert_eq!(outcome.modules, 2);
        assert!(!outcome.has_errors());
        let observed: Vec<(&str, &str, f64)> = outcome
            .observations()
            .map(|o| (o.labels.module.as_str(), o.identity.name.as_str(), o.value))
            .collect();
        assert_eq!(
            observed,
            [("1", STATUS, 0.0), ("1", POWER, 42.0), ("2", STATUS, 1.0)]
        );
        assert!(outcome.find(POWER, "2").is_none());
    }

    #[test]
    fn test_conversion_failure_does_not_stop_siblings() {
        let raw = "[Module 1]\nStatus | ???\nInput Power | 42 W\n\n[Module 2]\nStatus | [STATUS OK]\nInput Power | 1.5 kW\n";
        let outcome = assemble("node01", raw, &MetricCatalog::standard());

        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.find(POWER, "1").map(|o| o.value), Some(42.0));
        assert_eq!(outcome.find(STATUS, "2").map(|o| o.value), Some(0.0));

        let errors: Vec<(&str, Option<&str>, FailureKind)> = outcome
            .errors()
            .map(|e| (e.labels.module.as_str(), e.metric.as_deref(), e.failure.kind))
            .collect();
        assert_eq!(
            errors,
            [
                ("1", Some(STATUS), FailureKind::UnrecognizedStatus),
                ("2", Some(POWER), FailureKind::InvalidPowerFormat),
            ]
        );
    }

    #[test]
    fn test_records_follow_block_then_catalog_order() {
        let raw = "[Module 2]\nInput Power | 5 W\nStatus | OK\n\n[Module 1]\nInput Power | 6 W\nStatus | OK\n";
        let outcome = assemble("node01", raw, &MetricCatalog::standard());
        let order: Vec<(&str, &str)> = outcome
            .observations()
            .map(|o| (o.labels.module.as_str(), o.identity.name.as_str()))
            .collect();
        assert_eq!(order, [("2", STATUS), ("2", POWER), ("1", STATUS), ("1", POWER)]);
    }

    #[test]
    fn test_empty_section_is_malformed() {
        let raw = "[Module 1]\n\n[Module 2]\nStatus | OK\n";
        let outcome = assemble("node01", raw, &MetricCatalog::standard());
        let marker = outcome.errors().next().unwrap();
        assert_eq!(marker.labels.module, "1");
        assert_eq!(marker.metric, None);
        assert_eq!(marker.failure.kind, FailureKind::MalformedSection);
        assert_eq!(outcome.find(STATUS, "2").map(|o| o.value), Some(0.0));
    }

    #[test]
    fn test_section_with_only_column_header_is_malformed() {
        let raw = "[Module 1]\n Item | Value\n ---- | -----\n";
        let outcome = assemble("node01", raw, &MetricCatalog::standard());
        let kinds: Vec<(Option<&str>, FailureKind)> = outcome
            .errors()
            .map(|e| (e.metric.as_deref(), e.failure.kind))
            .collect();
        assert_eq!(kinds, [(None, FailureKind::MalformedSection)]);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = "[Module 1]\nFan 1 | 3328 RPM\nTemperature 1 | 34C/93F\n";
        let outcome = assemble("node01", raw, &MetricCatalog::standard());
        assert_eq!(outcome.modules, 1);
        assert!(outcome.records.is_empty());
    }

    #[test]
    fn test_labels_carry_target_and_source_index() {
        let raw = "[SlaveAddress = 7Ah] [Module 12]\nStatus | OK\n";
        let outcome = assemble("bmc-rack3", raw, &MetricCatalog::standard());
        let status = outcome.find(STATUS, "12").unwrap();
        assert_eq!(status.labels, Labels::new("bmc-rack3", "12"));
    }

    #[test]
    fn test_custom_segmenter() {
        let catalog = MetricCatalog::standard();
        let segmenter = Segmenter::with_pattern(r"(?m)^== PSU (?P<index>\d+) ==").unwrap();
        let assembler = Assembler::new(&catalog).with_segmenter(segmenter);
        let outcome = assembler.assemble("node01", "== PSU 3 ==\nStatus | OK\n");
        assert_eq!(outcome.find(STATUS, "3").map(|o| o.value), Some(0.0));
    }

    #[test]
    fn test_no_modules_is_not_an_error() {
        let outcome = assemble("node01", "", &MetricCatalog::standard());
        assert_eq!(outcome.modules, 0);
        assert!(outcome.records.is_empty());
        assert!(!outcome.has_errors());
    }
}
