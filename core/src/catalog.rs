//! Registry of recognized `pminfo` fields.
//!
//! A [`MetricCatalog`] maps field names (plus the spellings used by other
//! firmware and tool versions) to a [`MetricDefinition`]. The catalog is
//! built once and handed to the assembler by reference; it never discovers
//! fields on its own, so fields it does not know are ignored.
//!
//! # Examples
//!
//! ```
//! use smcipmi_exporter_core::{FieldMap, MetricCatalog, lookup};
//!
//! let catalog = MetricCatalog::standard();
//! let power = catalog.get("Input Power").unwrap();
//!
//! let fields: FieldMap = [("Input Power (DC)", "198 W")].into_iter().collect();
//! assert_eq!(lookup(&fields, power), Some("198 W"));
//! ```

use thiserror::Error;

use crate::convert::{
    ConversionFailure, Converter, convert_current, convert_power_consumption,
    convert_power_supply_status, convert_voltage,
};
use crate::types::{FieldMap, OutputIdentity, PMINFO_SUBSYSTEM, ValueKind, fq_name};

/// Errors raised while registering definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Another definition already claims this field name.
    #[error("duplicate field name in catalog: {0}")]
    DuplicateField(String),
    /// Another definition already publishes this metric.
    #[error("duplicate metric name in catalog: {0}")]
    DuplicateMetric(String),
}

/// How one recognized field becomes a metric.
#[derive(Debug, Clone)]
pub struct MetricDefinition {
    /// Primary field name, tried first.
    pub canonical_name: String,
    /// Alternate field names, tried in order after the canonical name.
    pub aliases: Vec<String>,
    pub identity: OutputIdentity,
    pub kind: ValueKind,
    pub converter: Converter,
}

impl MetricDefinition {
    pub fn new(
        canonical_name: impl Into<String>,
        identity: OutputIdentity,
        kind: ValueKind,
        converter: Converter,
    ) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            aliases: Vec::new(),
            identity,
            kind,
            converter,
        }
    }

    /// Adds an alternate field name with lower priority than existing ones.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Canonical name followed by aliases, in lookup order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn convert(&self, raw: &str) -> Result<f64, ConversionFailure> {
        (self.converter)(raw)
    }
}

/// Resolves `definition` against `fields`, returning the first value found
/// under the canonical name or one of its aliases.
pub fn lookup<'a>(fields: &'a FieldMap, definition: &MetricDefinition) -> Option<&'a str> {
    definition.field_names().find_map(|name| fields.get(name))
}

/// Immutable set of metric definitions, in registration order.
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    definitions: Vec<MetricDefinition>,
}

impl MetricCatalog {
    /// Creates a catalog without definitions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Power-supply status and input power.
    pub fn standard() -> Self {
        Self {
            definitions: vec![power_supply_status(), power_consumption()],
        }
    }

    /// [`standard`](Self::standard) plus output power, input voltage and
    /// input current.
    pub fn with_electrical_readings() -> Self {
        Self {
            definitions: vec![
                power_supply_status(),
                power_consumption(),
                output_power(),
                input_voltage(),
                input_current(),
            ],
        }
    }

    /// Adds a definition after the existing ones.
    ///
    /// # Errors
    ///
    /// Fails if any of its field names or its metric name is already taken.
    pub fn register(&mut self, definition: MetricDefinition) -> Result<(), CatalogError> {
        for name in definition.field_names() {
            if self.resolve_field(name).is_some() {
                return Err(CatalogError::DuplicateField(name.to_string()));
            }
        }
        if self
            .definitions
            .iter()
            .any(|existing| existing.identity.name == definition.identity.name)
        {
            return Err(CatalogError::DuplicateMetric(definition.identity.name));
        }
        self.definitions.push(definition);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn with(mut self, definition: MetricDefinition) -> Result<Self, CatalogError> {
        self.register(definition)?;
        Ok(self)
    }

    /// Finds a definition by canonical name.
    pub fn get(&self, canonical_name: &str) -> Option<&MetricDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.canonical_name == canonical_name)
    }

    /// Finds the definition that claims `field`, as canonical name or alias.
    pub fn resolve_field(&self, field: &str) -> Option<&MetricDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.field_names().any(|name| name == field))
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn power_supply_status() -> MetricDefinition {
    MetricDefinition::new(
        "Status",
        OutputIdentity::new(
            fq_name(PMINFO_SUBSYSTEM, "power_supply_status"),
            "Power supply status (0=OK, 1=OFF, 2=Failure, 3=Failure and OFF)",
        ),
        ValueKind::Status,
        convert_power_supply_status,
    )
}

fn power_consumption() -> MetricDefinition {
    // SMCIPMITool prints `Input Power (DC)` on some firmware; the BMC web UI
    // calls the same reading `AC Input Power`.
    MetricDefinition::new(
        "Input Power",
        OutputIdentity::new(
            fq_name(PMINFO_SUBSYSTEM, "power_consumption_watts"),
            "Current power consumption measured in watts",
        ),
        ValueKind::Watts,
        convert_power_consumption,
    )
    .with_alias("Input Power (DC)")
    .with_alias("AC Input Power")
}

fn output_power() -> MetricDefinition {
    MetricDefinition::new(
        "Main Output Power",
        OutputIdentity::new(
            fq_name(PMINFO_SUBSYSTEM, "output_power_watts"),
            "Main output power of the power supply in watts",
        ),
        ValueKind::Watts,
        convert_power_consumption,
    )
}

fn input_voltage() -> MetricDefinition {
    MetricDefinition::new(
        "Input Voltage",
        OutputIdentity::new(
            fq_name(PMINFO_SUBSYSTEM, "input_voltage_volts"),
            "Input voltage of the power supply in volts",
        ),
        ValueKind::Volts,
        convert_voltage,
    )
}

fn input_current() -> MetricDefinition {
    MetricDefinition::new(
        "Input Current",
        OutputIdentity::new(
            fq_name(PMINFO_SUBSYSTEM, "input_current_amperes"),
            "Input current of the power supply in amperes",
        ),
        ValueKind::Amperes,
        convert_current,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_contents() {
        let catalog = MetricCatalog::standard();
        let names: Vec<&str> = catalog
            .definitions()
            .iter()
            .map(|d| d.identity.name.as_str())
            .collect();
        assert_eq!(
            names,
            ["smcipmi_pminfo_power_supply_status", "smcipmi_pminfo_power_consumption_watts"]
        );
    }

    #[test]
    fn test_canonical_name_beats_aliases() {
        let catalog = MetricCatalog::standard();
        let power = catalog.get("Input Power").unwrap();
        let fields: FieldMap = [
            ("AC Input Power", "3 W"),
            ("Input Power (DC)", "2 W"),
            ("Input Power", "1 W"),
        ]
        .into_iter()
        .collect();
        assert_eq!(lookup(&fields, power), Some("1 W"));
    }

    #[test]
    fn test_aliases_in_declared_order() {
        let catalog = MetricCatalog::standard();
        let power = catalog.get("Input Power").unwrap();
        let fields: FieldMap = [("AC Input Power", "3 W"), ("Input Power (DC)", "2 W")]
            .into_iter()
            .collect();
        assert_eq!(lookup(&fields, power), Some("2 W"));

        let only_ac: FieldMap = [("AC Input Power", "3 W")].into_iter().collect();
        assert_eq!(lookup(&only_ac, power), Some("3 W"));
    }

    #[test]
    fn test_lookup_miss() {
        let catalog = MetricCatalog::standard();
        let status = catalog.get("Status").unwrap();
        let fields: FieldMap = [("Input Power", "1 W")].into_iter().collect();
        assert_eq!(lookup(&fields, status), None);
    }

    #[test]
    fn test_resolve_field_by_alias() {
        let catalog = MetricCatalog::standard();
        let definition = catalog.resolve_field("Input Power (DC)").unwrap();
        assert_eq!(definition.canonical_name, "Input Power");
        assert!(catalog.resolve_field("Fan 1").is_none());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut catalog = MetricCatalog::standard();
        let clash = MetricDefinition::new(
            "Power In",
            OutputIdentity::new("other", "help"),
            ValueKind::Watts,
            convert_power_consumption,
        )
        .with_alias("AC Input Power");
        assert_eq!(
            catalog.register(clash),
            Err(CatalogError::DuplicateField("AC Input Power".into()))
        );

        let same_metric = MetricDefinition::new(
            "Power In",
            OutputIdentity::new(fq_name(PMINFO_SUBSYSTEM, "power_consumption_watts"), "help"),
            ValueKind::Watts,
            convert_power_consumption,
        );
        assert!(matches!(
            catalog.register(same_metric),
            Err(CatalogError::DuplicateMetric(_))
        ));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_register_appends_in_order() {
        let catalog = MetricCatalog::empty()
            .with(input_voltage())
            .and_then(|c| c.with(input_current()))
            .unwrap();
        assert_eq!(catalog.definitions()[0].canonical_name, "Input Voltage");
        assert_eq!(catalog.definitions()[1].canonical_name, "Input Current");
    }

    #[test]
    fn test_electrical_readings_extend_standard() {
        let catalog = MetricCatalog::with_electrical_readings();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.get("Input Voltage").unwrap().convert("230.5 V"), Ok(230.5));
        assert_eq!(catalog.get("Main Output Power").unwrap().kind, ValueKind::Watts);
    }
}
