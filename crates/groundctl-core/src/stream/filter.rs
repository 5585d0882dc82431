// ── Surface identity and device filters ──
//
// A surface (one window) resolves the subset of the active mapping table
// its kind displays. The filter presets here are the closed sets those
// surfaces use.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::model::SensorType;

// ── SensorFilter ─────────────────────────────────────────────────────

/// Closed set of sensor types a surface shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorFilter {
    types: HashSet<SensorType>,
}

impl SensorFilter {
    pub fn from_types(types: impl IntoIterator<Item = SensorType>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }

    pub fn valves() -> Self {
        Self::from_types([SensorType::Valve])
    }

    pub fn sensors() -> Self {
        Self::from_types([
            SensorType::Tc,
            SensorType::Pt,
            SensorType::FlowMeter,
            SensorType::LoadCell,
        ])
    }

    /// Power rails.
    pub fn power() -> Self {
        Self::from_types(SensorType::iter().filter(|t| t.is_rail()))
    }

    /// Per-valve current and voltage monitoring channels.
    pub fn valve_telemetry() -> Self {
        Self::from_types([SensorType::ValveCurrent, SensorType::ValveVoltage])
    }

    pub fn all() -> Self {
        Self::from_types(SensorType::iter())
    }

    pub fn union(mut self, other: &Self) -> Self {
        self.types.extend(other.types.iter().copied());
        self
    }

    pub fn matches(&self, sensor_type: SensorType) -> bool {
        self.types.contains(&sensor_type)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ── SurfaceKind ──────────────────────────────────────────────────────

/// Kind of display surface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SurfaceKind {
    /// Sensor-actuator board window: one board's valves and sensors.
    Sam,
    Bms,
    Ahrs,
    /// P&ID diagram: valves and sensors across every board.
    Pid,
    Sequences,
    System,
}

impl SurfaceKind {
    /// Sensor types this kind of surface resolves, if any.
    pub fn device_filter(self) -> Option<SensorFilter> {
        match self {
            Self::Sam | Self::Pid => Some(SensorFilter::valves().union(&SensorFilter::sensors())),
            Self::Bms | Self::Ahrs | Self::Sequences | Self::System => None,
        }
    }

    /// Whether the surface ignores its label when picking a board.
    pub fn spans_all_boards(self) -> bool {
        self == Self::Pid
    }
}

// ── Surface ──────────────────────────────────────────────────────────

/// One display window: its kind plus the label it was opened with
/// (for SAM windows, the board id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Surface {
    pub kind: SurfaceKind,
    pub label: String,
}

impl Surface {
    pub fn new(kind: SurfaceKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }

    pub fn sam(board_id: impl Into<String>) -> Self {
        Self::new(SurfaceKind::Sam, board_id)
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.label)
    }
}
