//! Data model shared by the extraction pipeline.
//!
//! Raw `pminfo` text is split into [`ModuleBlock`]s, each block yields a
//! [`FieldMap`], and the assembler turns resolved fields into
//! [`MetricRecord`]s collected in an [`ExtractionOutcome`]. All record types
//! serialize with [`serde`] so a polling cycle can be dumped as JSON or YAML.

use serde::{Deserialize, Serialize};

use crate::convert::ConversionFailure;

/// Metric namespace shared by every series the exporter publishes.
pub const NAMESPACE: &str = "smcipmi";

/// Subsystem used for metrics derived from the `pminfo` subcommand.
pub const PMINFO_SUBSYSTEM: &str = "pminfo";

/// Builds a fully qualified metric name (`namespace_subsystem_name`).
///
/// Empty components are skipped, so `fq_name("", "up")` yields
/// `smcipmi_up`.
///
/// # Examples
///
/// ```
/// use smcipmi_exporter_core::fq_name;
///
/// assert_eq!(fq_name("pminfo", "power_consumption_watts"), "smcipmi_pminfo_power_consumption_watts");
/// assert_eq!(fq_name("", "up"), "smcipmi_up");
/// ```
pub fn fq_name(subsystem: &str, name: &str) -> String {
    [NAMESPACE, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// One power-supply module section cut out of a raw report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleBlock {
    /// Module index exactly as printed in the header (e.g. `"1"`).
    pub index: String,
    /// PMBus slave address from `[SlaveAddress = 78h]` headers, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Text between the header and the end of the section.
    pub body: String,
}

/// Trimmed `name -> value` pairs of one module section.
///
/// Names are unique. Inserting an existing name replaces its value but keeps
/// the position of the first occurrence, so iteration follows the order in
/// which names first appeared in the block.
///
/// # Examples
///
/// ```
/// use smcipmi_exporter_core::FieldMap;
///
/// let mut fields = FieldMap::new();
/// fields.insert("Status", "[STATUS OK] (00h)");
/// fields.insert("Input Power", "120 W");
/// fields.insert("Status", "[UNIT IS OFF] (40h)");
///
/// assert_eq!(fields.len(), 2);
/// assert_eq!(fields.get("Status"), Some("[UNIT IS OFF] (40h)"));
/// assert_eq!(fields.names().collect::<Vec<_>>(), ["Status", "Input Power"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, returning the value it replaced (last match wins).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Returns the value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field names in first-appearance order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// `(name, value)` pairs in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// Kind of value a metric definition produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Enumerated power-supply state (0-3).
    Status,
    Watts,
    Volts,
    Amperes,
}

impl ValueKind {
    /// Unit suffix printed by the vendor tool, if the kind has one.
    pub fn unit(self) -> Option<&'static str> {
        match self {
            Self::Status => None,
            Self::Watts => Some("W"),
            Self::Volts => Some("V"),
            Self::Amperes => Some("A"),
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::Watts => write!(f, "watts"),
            Self::Volts => write!(f, "volts"),
            Self::Amperes => write!(f, "amperes"),
        }
    }
}

/// Name and help text of a published metric.
///
/// Every pminfo series carries the label pair `target`/`module`
/// ([`METRIC_LABELS`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputIdentity {
    pub name: String,
    pub help: String,
}

impl OutputIdentity {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
        }
    }
}

/// Label names attached to every observation, in declaration order.
pub const METRIC_LABELS: [&str; 2] = ["target", "module"];

/// Label values identifying where an observation came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Labels {
    /// Host the vendor tool was pointed at.
    pub target: String,
    /// Module index as printed by the tool, never renumbered.
    pub module: String,
}

impl Labels {
    pub fn new(target: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            module: module.into(),
        }
    }

    /// Values ordered like [`METRIC_LABELS`].
    pub fn values(&self) -> [&str; 2] {
        [self.target.as_str(), self.module.as_str()]
    }
}

/// A converted, labeled metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub identity: OutputIdentity,
    pub kind: ValueKind,
    pub labels: Labels,
    pub value: f64,
}

/// A known field that could not be turned into an observation.
///
/// `metric` is `None` for section-level problems such as a module block
/// without any parsable field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    pub failure: ConversionFailure,
}

/// One entry of an [`ExtractionOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum MetricRecord {
    Observation(Observation),
    Error(ErrorMarker),
}

/// Result of running the extraction pipeline over one raw report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    /// Host the report belongs to.
    pub target: String,
    /// Number of module sections found in the report.
    pub modules: usize,
    /// Records in block order, then catalog order.
    pub records: Vec<MetricRecord>,
}

impl ExtractionOutcome {
    /// Creates an outcome with no modules and no records.
    pub fn empty(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            modules: 0,
            records: Vec::new(),
        }
    }

    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.records.iter().filter_map(|record| match record {
            MetricRecord::Observation(observation) => Some(observation),
            MetricRecord::Error(_) => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorMarker> {
        self.records.iter().filter_map(|record| match record {
            MetricRecord::Error(marker) => Some(marker),
            MetricRecord::Observation(_) => None,
        })
    }

    /// Returns `true` if any record is an error marker.
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Finds the observation for `metric` on `module`.
    pub fn find(&self, metric: &str, module: &str) -> Option<&Observation> {
        self.observations()
            .find(|o| o.identity.name == metric && o.labels.module == module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::FailureKind;

    fn observation(metric: &str, module: &str, value: f64) -> MetricRecord {
        MetricRecord::Observation(Observation {
            identity: OutputIdentity::new(metric, "help"),
            kind: ValueKind::Watts,
            labels: Labels::new("node01", module),
            value,
        })
    }

    #[test]
    fn test_field_map_last_match_wins_keeps_first_position() {
        let fields: FieldMap = [("A", "1"), ("B", "2"), ("A", "3")].into_iter().collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("A"), Some("3"));
        assert_eq!(fields.iter().collect::<Vec<_>>(), [("A", "3"), ("B", "2")]);
    }

    #[test]
    fn test_field_map_insert_returns_replaced_value() {
        let mut fields = FieldMap::new();
        assert_eq!(fields.insert("Status", "OK"), None);
        assert_eq!(fields.insert("Status", "OFF"), Some("OK".to_string()));
        assert!(fields.contains("Status"));
        assert!(!fields.contains("status"));
    }

    #[test]
    fn test_outcome_partitions_records() {
        let outcome = ExtractionOutcome {
            target: "node01".into(),
            modules: 2,
            records: vec![
                observation("power", "1", 42.0),
                MetricRecord::Error(ErrorMarker {
                    labels: Labels::new("node01", "2"),
                    metric: Some("power".into()),
                    failure: ConversionFailure::new(FailureKind::InvalidPowerFormat, "42 kW"),
                }),
            ],
        };

        assert_eq!(outcome.observations().count(), 1);
        assert_eq!(outcome.errors().count(), 1);
        assert!(outcome.has_errors());
        assert_eq!(outcome.find("power", "1").map(|o| o.value), Some(42.0));
        assert!(outcome.find("power", "2").is_none());
    }

    #[test]
    fn test_record_serializes_with_tag() {
        let json = serde_json::to_string(&observation("power", "1", 7.0)).unwrap();
        assert!(json.contains("\"record\":\"observation\""));
        assert!(json.contains("\"module\":\"1\""));
    }

    #[test]
    fn test_value_kind_units() {
        assert_eq!(ValueKind::Status.unit(), None);
        assert_eq!(ValueKind::Watts.unit(), Some("W"));
        assert_eq!(ValueKind::Amperes.to_string(), "amperes");
    }
}
