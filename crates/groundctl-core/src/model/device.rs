use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use super::mapping::{MappingEntry, SensorType};

/// Group assigned to freshly resolved records.
pub(crate) const DEFAULT_GROUP: &str = "Fuel";
/// Unit shown until the first reading arrives.
pub(crate) const DEFAULT_UNIT: &str = "?";

// ── ValveState ───────────────────────────────────────────────────────

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ValveState {
    Open,
    #[default]
    Closed,
    Disconnected,
    Undetermined,
    Fault,
}

// ── DeviceKind ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    Valve,
    Sensor,
}

// ── Records ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveRecord {
    pub name: String,
    pub group: String,
    pub board_id: String,
    pub sensor_type: SensorType,
    pub channel: u32,
    pub commanded: ValveState,
    pub actual: ValveState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub name: String,
    pub group: String,
    pub board_id: String,
    pub sensor_type: SensorType,
    pub channel: u32,
    pub unit: String,
    pub value: f64,
    pub offset: f64,
}

/// Runtime view of one mapped device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceRecord {
    Valve(ValveRecord),
    Sensor(SensorRecord),
}

impl DeviceRecord {
    /// Seed a record for `entry` with the defaults a surface shows before
    /// any telemetry arrives.
    pub fn seed(entry: &MappingEntry) -> Self {
        if entry.sensor_type.is_valve() {
            Self::Valve(ValveRecord {
                name: entry.text_id.clone(),
                group: DEFAULT_GROUP.to_owned(),
                board_id: entry.board_id.clone(),
                sensor_type: entry.sensor_type,
                channel: entry.channel,
                commanded: ValveState::Closed,
                actual: ValveState::Disconnected,
            })
        } else {
            Self::Sensor(SensorRecord {
                name: entry.text_id.clone(),
                group: DEFAULT_GROUP.to_owned(),
                board_id: entry.board_id.clone(),
                sensor_type: entry.sensor_type,
                channel: entry.channel,
                unit: DEFAULT_UNIT.to_owned(),
                value: 0.0,
                offset: entry.calibrated_offset,
            })
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Valve(v) => &v.name,
            Self::Sensor(s) => &s.name,
        }
    }

    pub fn board_id(&self) -> &str {
        match self {
            Self::Valve(v) => &v.board_id,
            Self::Sensor(s) => &s.board_id,
        }
    }

    pub fn sensor_type(&self) -> SensorType {
        match self {
            Self::Valve(v) => v.sensor_type,
            Self::Sensor(s) => s.sensor_type,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Valve(_) => DeviceKind::Valve,
            Self::Sensor(_) => DeviceKind::Sensor,
        }
    }

    pub fn as_valve(&self) -> Option<&ValveRecord> {
        match self {
            Self::Valve(v) => Some(v),
            Self::Sensor(_) => None,
        }
    }

    pub fn as_sensor(&self) -> Option<&SensorRecord> {
        match self {
            Self::Sensor(s) => Some(s),
            Self::Valve(_) => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Computer;

    #[test]
    fn valve_seed_defaults() {
        let entry = MappingEntry::new("FV01", "sam-01", SensorType::Valve, 4, Computer::Flight);
        let DeviceRecord::Valve(valve) = DeviceRecord::seed(&entry) else {
            panic!("expected a valve record");
        };
        assert_eq!(valve.commanded, ValveState::Closed);
        assert_eq!(valve.actual, ValveState::Disconnected);
        assert_eq!(valve.group, "Fuel");
        assert_eq!(valve.channel, 4);
    }

    #[test]
    fn sensor_seed_uses_calibrated_offset() {
        let mut entry = MappingEntry::new("PT01", "sam-01", SensorType::Pt, 2, Computer::Flight);
        entry.calibrated_offset = -0.75;
        let record = DeviceRecord::seed(&entry);
        let sensor = record.as_sensor().unwrap();
        assert_eq!(sensor.unit, "?");
        assert!(sensor.value.abs() < f64::EPSILON);
        assert!((sensor.offset + 0.75).abs() < f64::EPSILON);
        assert_eq!(record.kind(), DeviceKind::Sensor);
    }

    #[test]
    fn valve_state_parses_any_case() {
        assert_eq!("OPEN".parse::<ValveState>().unwrap(), ValveState::Open);
        assert_eq!("undetermined".parse::<ValveState>().unwrap(), ValveState::Undetermined);
        assert!("half-open".parse::<ValveState>().is_err());
    }
}
