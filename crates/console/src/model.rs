use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Manual,
    Automatic,
}

/// Pump actuator state. Travels as a JSON boolean on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum PumpStatus {
    On,
    Off,
}

impl PumpStatus {
    pub fn is_on(self) -> bool {
        self == PumpStatus::On
    }

    pub fn toggled(self) -> Self {
        match self {
            PumpStatus::On => PumpStatus::Off,
            PumpStatus::Off => PumpStatus::On,
        }
    }
}

impl From<bool> for PumpStatus {
    fn from(on: bool) -> Self {
        if on {
            PumpStatus::On
        } else {
            PumpStatus::Off
        }
    }
}

impl From<PumpStatus> for bool {
    fn from(status: PumpStatus) -> Self {
        status.is_on()
    }
}

/// Full control configuration as held by the control authority. Every write
/// carries all four fields; the backend replaces its state wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    pub mode: Mode,
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub pump_status: PumpStatus,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Automatic,
            low_threshold: 30.0,
            high_threshold: 60.0,
            pump_status: PumpStatus::Off,
        }
    }
}

/// The part of the configuration served by `GET /status`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlSettings {
    pub mode: Mode,
    pub low_threshold: f64,
    pub high_threshold: f64,
}

impl ControlSettings {
    pub fn with_pump(self, pump_status: PumpStatus) -> ControlConfig {
        ControlConfig {
            mode: self.mode,
            low_threshold: self.low_threshold,
            high_threshold: self.high_threshold,
            pump_status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

/// One `GET /latest` result: sensor values plus the pump state the backend
/// last reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestReading {
    pub sample: TelemetrySample,
    pub pump_status: PumpStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
}

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct LatestMsg {
    pub(crate) temperature: f64,
    pub(crate) humidity: f64,
    pub(crate) soil: f64,
    #[serde(default)]
    pub(crate) pump_status: bool,
}

impl LatestMsg {
    pub(crate) fn into_reading(self, observed_at: OffsetDateTime) -> LatestReading {
        LatestReading {
            sample: TelemetrySample {
                temperature: self.temperature,
                humidity: self.humidity,
                soil_moisture: self.soil,
                observed_at,
            },
            pump_status: self.pump_status.into(),
        }
    }
}

/// Error body of a rejected request: `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct DetailMsg {
    pub(crate) detail: serde_json::Value,
}

impl DetailMsg {
    /// FastAPI-style backends send either a string or a list of validation
    /// objects; flatten both to one line.
    pub(crate) fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryMsg {
    pub(crate) records: Vec<Vec<serde_json::Value>>,
}

impl HistoryMsg {
    /// Rows are `[timestamp, temperature, humidity, soil]`. Cells that are
    /// missing or not numeric read as `0.0`; rows without a timestamp are
    /// dropped.
    pub(crate) fn into_records(self) -> Vec<HistoryRecord> {
        self.records
            .into_iter()
            .filter_map(|row| {
                let timestamp = match row.first()? {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => return None,
                    other => other.to_string(),
                };
                Some(HistoryRecord {
                    timestamp,
                    temperature: cell_f64(row.get(1)),
                    humidity: cell_f64(row.get(2)),
                    soil_moisture: cell_f64(row.get(3)),
                })
            })
            .collect()
    }
}

fn cell_f64(cell: Option<&serde_json::Value>) -> f64 {
    let v = match cell {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

// ===========================================================================
// Tests
// ===========================================================================
