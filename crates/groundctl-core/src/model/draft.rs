// ── Staged mapping edits ──
//
// Operators edit configurations as a grid of free-text cells. A draft
// holds that grid and only turns into a `Configuration` once every row
// validates, so a half-edited table never reaches the canonical state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::mapping::{Computer, Configuration, MappingEntry, SensorType};
use crate::error::CoreError;

/// One editable row, exactly as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRow {
    pub text_id: String,
    pub board_id: String,
    pub sensor_type: String,
    pub channel: String,
    pub computer: String,
}

impl From<&MappingEntry> for DraftRow {
    fn from(entry: &MappingEntry) -> Self {
        Self {
            text_id: entry.text_id.clone(),
            board_id: entry.board_id.clone(),
            sensor_type: entry.sensor_type.to_string(),
            channel: entry.channel.to_string(),
            computer: entry.computer.to_string(),
        }
    }
}

/// Staged edit buffer for a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDraft {
    pub name: String,
    rows: Vec<DraftRow>,
    /// Calibration fields of rows seeded from an existing configuration,
    /// keyed by original name, so editing the grid does not lose them.
    #[serde(skip)]
    carried: Vec<MappingEntry>,
}

impl Default for MappingDraft {
    fn default() -> Self {
        Self::blank()
    }
}

impl MappingDraft {
    /// A new configuration: no name, one empty row.
    pub fn blank() -> Self {
        Self {
            name: String::new(),
            rows: vec![DraftRow::default()],
            carried: Vec::new(),
        }
    }

    /// Start editing an existing configuration.
    pub fn from_configuration(config: &Configuration) -> Self {
        let mut rows: Vec<DraftRow> = config.mappings.iter().map(DraftRow::from).collect();
        if rows.is_empty() {
            rows.push(DraftRow::default());
        }
        Self {
            name: config.id.clone(),
            rows,
            carried: config.mappings.clone(),
        }
    }

    pub fn rows(&self) -> &[DraftRow] {
        &self.rows
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut DraftRow> {
        self.rows.get_mut(index)
    }

    pub fn push_row(&mut self, row: DraftRow) {
        self.rows.push(row);
    }

    pub fn add_blank_row(&mut self) {
        self.rows.push(DraftRow::default());
    }

    /// Remove a row. Removing the only row leaves a single blank row.
    pub fn remove_row(&mut self, index: usize) {
        if index >= self.rows.len() {
            return;
        }
        if self.rows.len() == 1 {
            self.rows[0] = DraftRow::default();
        } else {
            self.rows.remove(index);
        }
    }

    /// Validate every row and produce the configuration, or the first
    /// problem found (rows are numbered from 1).
    pub fn build(&self) -> Result<Configuration, CoreError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("configuration name must not be empty"));
        }

        let mut seen = HashSet::with_capacity(self.rows.len());
        let mut mappings = Vec::with_capacity(self.rows.len());
        for (index, row) in self.rows.iter().enumerate() {
            let entry = self.build_row(index + 1, row)?;
            if !seen.insert(entry.text_id.clone()) {
                return Err(CoreError::validation(format!(
                    "row {}: duplicate name '{}'",
                    index + 1,
                    entry.text_id
                )));
            }
            mappings.push(entry);
        }

        Ok(Configuration::new(name, mappings))
    }

    fn build_row(&self, row_no: usize, row: &DraftRow) -> Result<MappingEntry, CoreError> {
        let text_id = row.text_id.trim();
        if text_id.is_empty() {
            return Err(CoreError::validation(format!("row {row_no}: name must not be empty")));
        }
        let board_id = row.board_id.trim();
        if board_id.is_empty() {
            return Err(CoreError::validation(format!(
                "row {row_no} ({text_id}): board id must not be empty"
            )));
        }
        let sensor_type = SensorType::parse_loose(&row.sensor_type).ok_or_else(|| {
            CoreError::validation(format!(
                "row {row_no} ({text_id}): unknown channel type '{}'",
                row.sensor_type
            ))
        })?;
        let channel: u32 = row.channel.trim().parse().map_err(|_| {
            CoreError::validation(format!(
                "row {row_no} ({text_id}): channel '{}' is not a number",
                row.channel
            ))
        })?;
        let computer = Computer::parse_loose(&row.computer).ok_or_else(|| {
            CoreError::validation(format!(
                "row {row_no} ({text_id}): unknown computer '{}'",
                row.computer
            ))
        })?;

        let mut entry = MappingEntry::new(text_id, board_id, sensor_type, channel, computer);
        if let Some(previous) = self.carried.iter().find(|m| m.text_id == text_id) {
            entry.max = previous.max;
            entry.min = previous.min;
            entry.calibrated_offset = previous.calibrated_offset;
            entry.powered_threshold = previous.powered_threshold;
            entry.normally_closed = previous.normally_closed;
        }
        Ok(entry)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn row(text_id: &str, board: &str, kind: &str, channel: &str, computer: &str) -> DraftRow {
        DraftRow {
            text_id: text_id.into(),
            board_id: board.into(),
            sensor_type: kind.into(),
            channel: channel.into(),
            computer: computer.into(),
        }
    }

    #[test]
    fn builds_from_operator_text() {
        let mut draft = MappingDraft::blank();
        draft.name = "hotfire".into();
        *draft.row_mut(0).unwrap() = row("FV01", "sam-01", "VALVE", "3", "FLIGHT");
        draft.push_row(row("RAIL_A", "sam-01", "RAIL 5V5", " 7 ", "ground"));

        let config = draft.build().unwrap();
        assert_eq!(config.id, "hotfire");
        assert_eq!(config.mappings[0].sensor_type, SensorType::Valve);
        assert_eq!(config.mappings[1].sensor_type, SensorType::Rail5v5);
        assert_eq!(config.mappings[1].channel, 7);
        assert_eq!(config.mappings[1].computer, Computer::Ground);
    }

    #[test]
    fn empty_name_is_rejected() {
        let draft = MappingDraft::blank();
        let err = draft.build().unwrap_err();
        assert!(err.to_string().contains("name must not be empty"), "{err}");
    }

    #[test]
    fn bad_channel_names_the_row() {
        let mut draft = MappingDraft::blank();
        draft.name = "cfg".into();
        *draft.row_mut(0).unwrap() = row("PT01", "sam-01", "pt", "three", "flight");
        let err = draft.build().unwrap_err();
        assert!(err.to_string().contains("row 1 (PT01)"), "{err}");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut draft = MappingDraft::blank();
        draft.name = "cfg".into();
        *draft.row_mut(0).unwrap() = row("PT01", "sam-01", "pt", "1", "flight");
        draft.push_row(row("PT01", "sam-02", "pt", "2", "flight"));
        let err = draft.build().unwrap_err();
        assert!(err.to_string().contains("row 2: duplicate name 'PT01'"), "{err}");
    }

    #[test]
    fn removing_last_row_leaves_blank_row() {
        let mut draft = MappingDraft::blank();
        *draft.row_mut(0).unwrap() = row("PT01", "sam-01", "pt", "1", "flight");
        draft.remove_row(0);
        assert_eq!(draft.rows(), &[DraftRow::default()]);

        draft.add_blank_row();
        draft.remove_row(1);
        assert_eq!(draft.rows().len(), 1);
    }

    #[test]
    fn edit_keeps_calibration() {
        let mut entry = MappingEntry::new("PT01", "sam-01", SensorType::Pt, 1, Computer::Flight);
        entry.calibrated_offset = 2.5;
        entry.max = Some(500.0);
        let config = Configuration::new("cfg", vec![entry]);

        let mut draft = MappingDraft::from_configuration(&config);
        draft.row_mut(0).unwrap().channel = "9".into();
        let rebuilt = draft.build().unwrap();

        assert_eq!(rebuilt.mappings[0].channel, 9);
        assert_eq!(rebuilt.mappings[0].max, Some(500.0));
        assert!((rebuilt.mappings[0].calibrated_offset - 2.5).abs() < f64::EPSILON);
    }
}
