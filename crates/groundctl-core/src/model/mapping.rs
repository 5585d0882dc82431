use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::CoreError;

// ── SensorType ───────────────────────────────────────────────────────

/// Physical channel type of a mapping entry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SensorType {
    Valve,
    Tc,
    Pt,
    FlowMeter,
    LoadCell,
    Gpio,
    Led,
    #[serde(rename = "rail_3v3")]
    #[strum(serialize = "rail_3v3")]
    Rail3v3,
    #[serde(rename = "rail_5v")]
    #[strum(serialize = "rail_5v")]
    Rail5v,
    #[serde(rename = "rail_5v5")]
    #[strum(serialize = "rail_5v5")]
    Rail5v5,
    #[serde(rename = "rail_24v")]
    #[strum(serialize = "rail_24v")]
    Rail24v,
    CurrentLoop,
    DifferentialSignal,
    Rtd,
    ValveCurrent,
    ValveVoltage,
}

impl SensorType {
    /// Parse operator input: any case, spaces standing in for underscores
    /// (`"RAIL 3V3"`, `"Current Loop"`).
    pub fn parse_loose(input: &str) -> Option<Self> {
        Self::from_str(&normalize(input)).ok()
    }

    /// Valves carry commanded/actual state; everything else is a reading.
    pub fn is_valve(self) -> bool {
        self == Self::Valve
    }

    pub fn is_rail(self) -> bool {
        matches!(
            self,
            Self::Rail3v3 | Self::Rail5v | Self::Rail5v5 | Self::Rail24v
        )
    }
}

// ── Computer ─────────────────────────────────────────────────────────

/// Which flight computer owns the channel.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Computer {
    #[serde(alias = "FLIGHT", alias = "Flight")]
    Flight,
    #[serde(alias = "GROUND", alias = "Ground")]
    Ground,
}

impl Computer {
    pub fn parse_loose(input: &str) -> Option<Self> {
        Self::from_str(&normalize(input)).ok()
    }
}

fn normalize(input: &str) -> String {
    input.trim().replace(' ', "_")
}

// ── MappingEntry ─────────────────────────────────────────────────────

/// Binds one physical channel to a logical device name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub text_id: String,
    pub board_id: String,
    pub sensor_type: SensorType,
    pub channel: u32,
    pub computer: Computer,

    /// Full-scale bounds for current-loop and differential channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default)]
    pub calibrated_offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub powered_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normally_closed: Option<bool>,
}

impl MappingEntry {
    /// An entry with no calibration data.
    pub fn new(
        text_id: impl Into<String>,
        board_id: impl Into<String>,
        sensor_type: SensorType,
        channel: u32,
        computer: Computer,
    ) -> Self {
        Self {
            text_id: text_id.into(),
            board_id: board_id.into(),
            sensor_type,
            channel,
            computer,
            max: None,
            min: None,
            calibrated_offset: 0.0,
            powered_threshold: None,
            normally_closed: None,
        }
    }

    /// Board comparison is case-insensitive (`SAM-01` window, `sam-01` row).
    pub fn is_on_board(&self, board_id: &str) -> bool {
        self.board_id.eq_ignore_ascii_case(board_id)
    }
}

// ── Configuration ────────────────────────────────────────────────────

/// A named, ordered mapping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: String,
    pub mappings: Vec<MappingEntry>,
}

impl Configuration {
    pub fn new(id: impl Into<String>, mappings: Vec<MappingEntry>) -> Self {
        Self {
            id: id.into(),
            mappings,
        }
    }

    pub fn find(&self, text_id: &str) -> Option<&MappingEntry> {
        self.mappings.iter().find(|m| m.text_id == text_id)
    }

    pub fn contains(&self, text_id: &str) -> bool {
        self.find(text_id).is_some()
    }

    /// Distinct board ids in mapping order.
    pub fn boards(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.mappings
            .iter()
            .map(|m| m.board_id.as_str())
            .filter(|b| seen.insert(b.to_ascii_lowercase()))
            .collect()
    }

    /// Check that this configuration can be pushed to a server.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::validation("configuration id must not be empty"));
        }

        let mut names = HashSet::with_capacity(self.mappings.len());
        for (index, entry) in self.mappings.iter().enumerate() {
            let row = index + 1;
            if entry.text_id.trim().is_empty() {
                return Err(CoreError::validation(format!(
                    "mapping {row}: name must not be empty"
                )));
            }
            if entry.board_id.trim().is_empty() {
                return Err(CoreError::validation(format!(
                    "mapping {row} ({}): board id must not be empty",
                    entry.text_id
                )));
            }
            if !names.insert(entry.text_id.as_str()) {
                return Err(CoreError::validation(format!(
                    "mapping {row}: duplicate name '{}'",
                    entry.text_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sensor_type_accepts_operator_spellings() {
        assert_eq!(SensorType::parse_loose("RAIL 3V3"), Some(SensorType::Rail3v3));
        assert_eq!(
            SensorType::parse_loose("Current Loop"),
            Some(SensorType::CurrentLoop)
        );
        assert_eq!(SensorType::parse_loose(" tc "), Some(SensorType::Tc));
        assert_eq!(SensorType::parse_loose("VALVE VOLTAGE"), Some(SensorType::ValveVoltage));
        assert_eq!(SensorType::parse_loose("thermistor"), None);
    }

    #[test]
    fn sensor_type_wire_names() {
        assert_eq!(SensorType::Rail5v5.to_string(), "rail_5v5");
        assert_eq!(SensorType::FlowMeter.to_string(), "flow_meter");
        assert_eq!(
            serde_json::to_value(SensorType::Rail24v).unwrap(),
            serde_json::json!("rail_24v")
        );
        let parsed: SensorType = serde_json::from_str("\"rail_3v3\"").unwrap();
        assert_eq!(parsed, SensorType::Rail3v3);
    }

    #[test]
    fn computer_accepts_upper_case() {
        assert_eq!(Computer::parse_loose("FLIGHT"), Some(Computer::Flight));
        let parsed: Computer = serde_json::from_str("\"GROUND\"").unwrap();
        assert_eq!(parsed, Computer::Ground);
        assert_eq!(Computer::Flight.to_string(), "flight");
    }

    #[test]
    fn board_match_ignores_case() {
        let entry = MappingEntry::new("FV01", "sam-01", SensorType::Valve, 1, Computer::Flight);
        assert!(entry.is_on_board("SAM-01"));
        assert!(!entry.is_on_board("sam-02"));
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let config = Configuration::new(
            "cfg",
            vec![
                MappingEntry::new("FV01", "sam-01", SensorType::Valve, 1, Computer::Flight),
                MappingEntry::new("FV01", "sam-02", SensorType::Valve, 2, Computer::Flight),
            ],
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate name 'FV01'"), "{err}");
    }

    #[test]
    fn validate_rejects_blank_id() {
        let config = Configuration::new("  ", Vec::new());
        assert!(matches!(config.validate(), Err(CoreError::Validation { .. })));
    }

    #[test]
    fn boards_are_distinct_in_order() {
        let config = Configuration::new(
            "cfg",
            vec![
                MappingEntry::new("FV01", "sam-02", SensorType::Valve, 1, Computer::Flight),
                MappingEntry::new("PT01", "sam-01", SensorType::Pt, 1, Computer::Flight),
                MappingEntry::new("FV02", "SAM-02", SensorType::Valve, 2, Computer::Flight),
            ],
        );
        assert_eq!(config.boards(), vec!["sam-02", "sam-01"]);
    }
}
