//! OpenADR 2.0b vocabulary tables and validators.
//!
//! Most OpenADR vocabularies are open-ended: a deployment may introduce
//! private-use names as long as they carry an `x-` prefix. Those vocabularies
//! are kept as strings on the wire and validated with the `is_valid_*`
//! helpers here. The few closed vocabularies (opt type, event status) are
//! real enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::ActivePeriod;

// ---------------------------------------------------------------------------
// Report vocabularies
// ---------------------------------------------------------------------------

pub const REPORT_NAMES: &[&str] = &[
    "METADATA_HISTORY_USAGE",
    "HISTORY_USAGE",
    "METADATA_HISTORY_GREENBUTTON",
    "HISTORY_GREENBUTTON",
    "METADATA_TELEMETRY_USAGE",
    "TELEMETRY_USAGE",
    "METADATA_TELEMETRY_STATUS",
    "TELEMETRY_STATUS",
];

pub const READING_TYPES: &[&str] = &[
    "Direct Read",
    "Net",
    "Allocated",
    "Estimated",
    "Summed",
    "Derived",
    "Mean",
    "Peak",
    "Hybrid",
    "Contract",
    "Projected",
    "x-RMS",
    "x-notApplicable",
];

pub const REPORT_TYPES: &[&str] = &[
    "reading",
    "usage",
    "demand",
    "setPoint",
    "deltaUsage",
    "deltaSetPoint",
    "deltaDemand",
    "baseline",
    "deviation",
    "avgUsage",
    "avgDemand",
    "operatingState",
    "upRegulationCapacityAvailable",
    "downRegulationCapacityAvailable",
    "regulationSetpoint",
    "storedEnergy",
    "targetEnergyStorage",
    "availableEnergyStorage",
    "price",
    "level",
    "powerFactor",
    "percentUsage",
    "percentDemand",
    "x-resourceStatus",
];

pub const SI_SCALE_CODES: &[&str] =
    &["p", "n", "micro", "m", "c", "d", "k", "M", "G", "T", "none"];

pub const OPT_REASONS: &[&str] = &[
    "economic",
    "emergency",
    "mustRun",
    "notParticipating",
    "outageRunStatus",
    "overrideStatus",
    "participating",
    "x-schedule",
];

pub const SIGNAL_NAMES: &[&str] = &[
    "SIMPLE",
    "simple",
    "ELECTRICITY_PRICE",
    "ENERGY_PRICE",
    "DEMAND_CHARGE",
    "BID_PRICE",
    "BID_LOAD",
    "BID_ENERGY",
    "CHARGE_STATE",
    "LOAD_DISPATCH",
    "LOAD_CONTROL",
];

/// OpenADR application-layer status codes.
pub mod status_codes {
    pub const OK: u16 = 200;
    pub const OUT_OF_SEQUENCE: u16 = 450;
    pub const NOT_ALLOWED: u16 = 451;
    pub const INVALID_ID: u16 = 452;
    pub const NOT_RECOGNIZED: u16 = 453;
    pub const INVALID_DATA: u16 = 454;
    pub const COMPLIANCE_ERROR: u16 = 459;
    pub const SIGNAL_NOT_SUPPORTED: u16 = 460;
    pub const REPORT_NOT_SUPPORTED: u16 = 461;
    pub const TARGET_MISMATCH: u16 = 462;
    pub const NOT_REGISTERED_OR_AUTHORIZED: u16 = 463;
    pub const DEPLOYMENT_ERROR_OTHER: u16 = 469;
}

fn in_table_or_private(value: &str, table: &[&str]) -> bool {
    table.contains(&value) || value.starts_with("x-")
}

pub fn is_valid_report_name(name: &str) -> bool {
    in_table_or_private(name, REPORT_NAMES)
}

pub fn is_valid_reading_type(reading_type: &str) -> bool {
    in_table_or_private(reading_type, READING_TYPES)
}

pub fn is_valid_report_type(report_type: &str) -> bool {
    in_table_or_private(report_type, REPORT_TYPES)
}

/// Scale codes are a closed table; there is no private-use escape.
pub fn is_valid_scale(scale: &str) -> bool {
    SI_SCALE_CODES.contains(&scale)
}

pub fn is_valid_opt_reason(reason: &str) -> bool {
    in_table_or_private(reason, OPT_REASONS)
}

/// Signal names are matched strictly; an unknown name makes the whole event
/// response carry SIGNAL_NOT_SUPPORTED.
pub fn is_valid_signal_name(name: &str) -> bool {
    SIGNAL_NAMES.contains(&name)
}

// ---------------------------------------------------------------------------
// OptType
// ---------------------------------------------------------------------------

/// The two possible opt decisions a VEN can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptType {
    #[serde(rename = "optIn")]
    OptIn,
    #[serde(rename = "optOut")]
    OptOut,
}

impl std::fmt::Display for OptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OptType::OptIn => "optIn",
            OptType::OptOut => "optOut",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optIn" => Ok(OptType::OptIn),
            "optOut" => Ok(OptType::OptOut),
            other => Err(format!("{other} is not a valid opt type")),
        }
    }
}

// ---------------------------------------------------------------------------
// EventStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    None,
    Far,
    Near,
    Active,
    Completed,
    Cancelled,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventStatus::None => "none",
            EventStatus::Far => "far",
            EventStatus::Near => "near",
            EventStatus::Active => "active",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Compute the status of an event from its active period at instant `now`.
///
/// The ramp-up window before `dtstart` counts as `Near`; everything earlier
/// is `Far`. Once `dtstart + duration` has passed the event is `Completed`.
pub fn determine_event_status(active_period: &ActivePeriod, now: DateTime<Utc>) -> EventStatus {
    let start = active_period.dtstart;
    let end = start
        + chrono::Duration::from_std(active_period.duration).unwrap_or(chrono::Duration::zero());

    if now >= end {
        return EventStatus::Completed;
    }
    if now >= start {
        return EventStatus::Active;
    }
    if let Some(ramp_up) = active_period.ramp_up_period {
        let near_start =
            start - chrono::Duration::from_std(ramp_up).unwrap_or(chrono::Duration::zero());
        if now >= near_start {
            return EventStatus::Near;
        }
    }
    EventStatus::Far
}

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------

/// Canonical descriptor for a well-known OpenADR measurement code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalMeasurement {
    /// The oadr item name that goes on the wire.
    pub name: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    /// Units the VEN will accept from the user without a warning.
    pub acceptable_units: &'static [&'static str],
    /// Whether this quantity carries power attributes (AC/hertz/voltage).
    pub power_related: bool,
}

const MEASUREMENTS: &[(&str, CanonicalMeasurement)] = &[
    (
        "VOLTAGE",
        CanonicalMeasurement {
            name: "voltage",
            description: "Voltage",
            unit: "V",
            acceptable_units: &["V"],
            power_related: false,
        },
    ),
    (
        "CURRENT",
        CanonicalMeasurement {
            name: "current",
            description: "Current",
            unit: "A",
            acceptable_units: &["A"],
            power_related: false,
        },
    ),
    (
        "ENERGY_REAL",
        CanonicalMeasurement {
            name: "energyReal",
            description: "RealEnergy",
            unit: "Wh",
            acceptable_units: &["Wh"],
            power_related: false,
        },
    ),
    (
        "REAL_ENERGY",
        CanonicalMeasurement {
            name: "energyReal",
            description: "RealEnergy",
            unit: "Wh",
            acceptable_units: &["Wh"],
            power_related: false,
        },
    ),
    (
        "ENERGY_REACTIVE",
        CanonicalMeasurement {
            name: "energyReactive",
            description: "ReactiveEnergy",
            unit: "VArh",
            acceptable_units: &["VArh"],
            power_related: false,
        },
    ),
    (
        "ENERGY_APPARENT",
        CanonicalMeasurement {
            name: "energyApparent",
            description: "ApparentEnergy",
            unit: "VAh",
            acceptable_units: &["VAh"],
            power_related: false,
        },
    ),
    (
        "POWER_REAL",
        CanonicalMeasurement {
            name: "powerReal",
            description: "RealPower",
            unit: "W",
            acceptable_units: &["W"],
            power_related: true,
        },
    ),
    (
        "REAL_POWER",
        CanonicalMeasurement {
            name: "powerReal",
            description: "RealPower",
            unit: "W",
            acceptable_units: &["W"],
            power_related: true,
        },
    ),
    (
        "POWER_REACTIVE",
        CanonicalMeasurement {
            name: "powerReactive",
            description: "ReactivePower",
            unit: "VAr",
            acceptable_units: &["VAr"],
            power_related: true,
        },
    ),
    (
        "POWER_APPARENT",
        CanonicalMeasurement {
            name: "powerApparent",
            description: "ApparentPower",
            unit: "VA",
            acceptable_units: &["VA"],
            power_related: true,
        },
    ),
    (
        "FREQUENCY",
        CanonicalMeasurement {
            name: "frequency",
            description: "Frequency",
            unit: "Hz",
            acceptable_units: &["Hz"],
            power_related: false,
        },
    ),
    (
        "PULSE_COUNT",
        CanonicalMeasurement {
            name: "pulseCount",
            description: "pulse count",
            unit: "count",
            acceptable_units: &["count"],
            power_related: false,
        },
    ),
    (
        "TEMPERATURE",
        CanonicalMeasurement {
            name: "temperature",
            description: "temperature",
            unit: "celsius",
            acceptable_units: &["celsius", "fahrenheit"],
            power_related: false,
        },
    ),
    (
        "THERM",
        CanonicalMeasurement {
            name: "therm",
            description: "Therm",
            unit: "thm",
            acceptable_units: &["thm"],
            power_related: false,
        },
    ),
];

/// Look up the canonical descriptor for a measurement code.
///
/// The lookup is case-insensitive on the code (`"powerReal"`, `"POWER_REAL"`
/// and `"power_real"` all resolve).
pub fn canonical_measurement(code: &str) -> Option<&'static CanonicalMeasurement> {
    let upper = code.to_uppercase();
    MEASUREMENTS
        .iter()
        .find(|(key, m)| *key == upper || m.name.eq_ignore_ascii_case(code))
        .map(|(_, m)| m)
}
