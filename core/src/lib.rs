//! Extraction engine for SMCIPMITool `pminfo` output.
//!
//! This crate turns the loosely structured text printed by
//! `SMCIPMITool <host> <user> <password> pminfo` into typed, labeled metric
//! observations. It performs no I/O: callers hand in the raw text and get an
//! [`ExtractionOutcome`] back.
//!
//! The pipeline, leaves first:
//!
//! - [`Segmenter`]: cuts the report into per-module [`ModuleBlock`]s.
//! - [`extract_fields`]: reads `name | value` lines into a [`FieldMap`].
//! - [`MetricCatalog`]: maps known field names and aliases to
//!   [`MetricDefinition`]s.
//! - Converters ([`convert_power_supply_status`],
//!   [`convert_power_consumption`], ...): validate and convert raw values.
//! - [`Assembler`]: runs the above and collects observations and
//!   [`ErrorMarker`]s.
//!
//! A field missing from a module is skipped. A value that fails conversion
//! produces an error marker for that module and metric only.
//!
//! # Example
//!
//! ```
//! use smcipmi_exporter_core::*;
//!
//! let raw = "\
//!  [SlaveAddress = 78h] [Module 1]
//!  Item                           |                          Value
//!  ----                           |                          -----
//!  Status                         |              [STATUS OK](00h)
//!  Input Power                    |                          198 W
//!
//!  [SlaveAddress = 7Ah] [Module 2]
//!  Status                         |  [IOUT_OC_FAULT][UNIT IS OFF] (50h)
//!  Input Power                    |                            0 W
//! ";
//!
//! let catalog = MetricCatalog::standard();
//! let outcome = assemble("bmc-node01", raw, &catalog);
//!
//! assert_eq!(outcome.modules, 2);
//! assert_eq!(outcome.observations().count(), 4);
//! let status = outcome.find("smcipmi_pminfo_power_supply_status", "2").unwrap();
//! assert_eq!(status.value, 3.0);
//! ```

mod assemble;
mod catalog;
mod convert;
mod fields;
mod segment;
mod types;

pub use assemble::{Assembler, assemble};
pub use catalog::{CatalogError, MetricCatalog, MetricDefinition, lookup};
pub use convert::{
    ConversionFailure, Converter, FailureKind, PowerSupplyState, classify_power_supply_status,
    convert_current, convert_power_consumption, convert_power_supply_status, convert_voltage,
};
pub use fields::extract_fields;
pub use segment::{DEFAULT_MODULE_PATTERN, PatternError, Segmenter, segment};
pub use types::*;
