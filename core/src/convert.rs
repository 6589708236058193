//! Value converters for raw `pminfo` field strings.
//!
//! Each converter is total: it either returns a numeric value in the
//! metric's domain or a [`ConversionFailure`] naming why the raw text was
//! rejected. Nothing is silently coerced to a default.
//!
//! # Examples
//!
//! ```
//! use smcipmi_exporter_core::{FailureKind, convert_power_consumption, convert_power_supply_status};
//!
//! assert_eq!(convert_power_supply_status("[STATUS OK] (00h)"), Ok(0.0));
//! assert_eq!(convert_power_supply_status("[IOUT_OC_FAULT][UNIT IS OFF] (50h)"), Ok(3.0));
//!
//! assert_eq!(convert_power_consumption("42 W"), Ok(42.0));
//! let failure = convert_power_consumption("42 kW").unwrap_err();
//! assert_eq!(failure.kind, FailureKind::InvalidPowerFormat);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// Signature shared by all converters registered in the catalog.
pub type Converter = fn(&str) -> Result<f64, ConversionFailure>;

/// Why a raw value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Status text matched none of the status rules.
    UnrecognizedStatus,
    /// Power reading is not `<1-3 digits> W`.
    InvalidPowerFormat,
    /// Voltage/current reading is not `<number> <unit>`.
    InvalidReadingFormat,
    /// The numeric part passed format validation but did not parse.
    NumericParseError,
    /// A module section produced no usable fields.
    MalformedSection,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnrecognizedStatus => write!(f, "unrecognized_status"),
            Self::InvalidPowerFormat => write!(f, "invalid_power_format"),
            Self::InvalidReadingFormat => write!(f, "invalid_reading_format"),
            Self::NumericParseError => write!(f, "numeric_parse_error"),
            Self::MalformedSection => write!(f, "malformed_section"),
        }
    }
}

/// A raw value that could not be converted, kept verbatim for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {raw_value:?}")]
pub struct ConversionFailure {
    pub kind: FailureKind,
    pub raw_value: String,
}

impl ConversionFailure {
    pub fn new(kind: FailureKind, raw_value: impl Into<String>) -> Self {
        Self {
            kind,
            raw_value: raw_value.into(),
        }
    }
}

/// Classified power-supply state and its published gauge value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSupplyState {
    Ok,
    Off,
    Fault,
    FaultAndOff,
}

impl PowerSupplyState {
    /// Gauge value: 0=OK, 1=OFF, 2=Failure, 3=Failure and OFF.
    pub fn code(self) -> f64 {
        match self {
            Self::Ok => 0.0,
            Self::Off => 1.0,
            Self::Fault => 2.0,
            Self::FaultAndOff => 3.0,
        }
    }
}

/// Markers found in a status string. Several may be present at once, e.g.
/// `[IOUT_OC_FAULT][UNIT IS OFF] (50h)`.
#[derive(Debug, Clone, Copy)]
struct StatusMarkers {
    ok: bool,
    fault: bool,
    off: bool,
}

impl StatusMarkers {
    fn scan(raw: &str) -> Self {
        Self {
            ok: raw.contains("OK"),
            fault: raw.contains("FAULT"),
            // (00h) is the all-clear status word reported by units without output.
            off: raw.contains("OFF") || raw.contains("(00h)"),
        }
    }
}

struct StatusRule {
    state: PowerSupplyState,
    applies: fn(StatusMarkers) -> bool,
}

/// Evaluated top to bottom; the first applicable rule decides.
const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        state: PowerSupplyState::Ok,
        applies: |m| m.ok,
    },
    StatusRule {
        state: PowerSupplyState::Fault,
        applies: |m| m.fault && !m.off,
    },
    StatusRule {
        state: PowerSupplyState::Off,
        applies: |m| m.off && !m.fault,
    },
    StatusRule {
        state: PowerSupplyState::FaultAndOff,
        applies: |m| m.fault && m.off,
    },
];

/// Classifies a status string into a [`PowerSupplyState`].
pub fn classify_power_supply_status(raw: &str) -> Result<PowerSupplyState, ConversionFailure> {
    let markers = StatusMarkers::scan(raw);
    STATUS_RULES
        .iter()
        .find(|rule| (rule.applies)(markers))
        .map(|rule| rule.state)
        .ok_or_else(|| ConversionFailure::new(FailureKind::UnrecognizedStatus, raw))
}

/// Converts a `Status` field into its gauge code.
pub fn convert_power_supply_status(raw: &str) -> Result<f64, ConversionFailure> {
    classify_power_supply_status(raw).map(PowerSupplyState::code)
}

static POWER_CONSUMPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<value>[0-9]{1,3}) W$").expect("static regex must compile"));

static VOLTAGE_READING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<value>[0-9]+(?:\.[0-9]+)?) V$").expect("static regex must compile")
});

static CURRENT_READING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<value>[0-9]+(?:\.[0-9]+)?) A$").expect("static regex must compile")
});

/// Converts a power reading such as `198 W` into watts.
///
/// Only whole numbers with one to three ASCII digits and the literal ` W`
/// suffix are accepted.
pub fn convert_power_consumption(raw: &str) -> Result<f64, ConversionFailure> {
    parse_reading(&POWER_CONSUMPTION, raw, FailureKind::InvalidPowerFormat)
}

/// Converts a voltage reading such as `230.5 V` into volts.
pub fn convert_voltage(raw: &str) -> Result<f64, ConversionFailure> {
    parse_reading(&VOLTAGE_READING, raw, FailureKind::InvalidReadingFormat)
}

/// Converts a current reading such as `0.96 A` into amperes.
pub fn convert_current(raw: &str) -> Result<f64, ConversionFailure> {
    parse_reading(&CURRENT_READING, raw, FailureKind::InvalidReadingFormat)
}

fn parse_reading(
    pattern: &Regex,
    raw: &str,
    format_failure: FailureKind,
) -> Result<f64, ConversionFailure> {
    let number = pattern
        .captures(raw)
        .and_then(|caps| caps.name("value"))
        .ok_or_else(|| ConversionFailure::new(format_failure, raw))?;
    number
        .as_str()
        .parse::<f64>()
        .map_err(|_| ConversionFailure::new(FailureKind::NumericParseError, raw))
}
