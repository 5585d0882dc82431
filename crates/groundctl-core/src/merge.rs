// ── Telemetry merge engine ──
//
// Applies telemetry deltas to resolved device records by name. Only the
// fields a delta carries are overwritten; everything else is left alone.
// Problems with individual entries become `DataIntegrityFault`s and never
// stop the rest of the delta from applying.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::model::{
    CompositeValveState, Configuration, DeviceKind, DeviceRecord, Measurement, SensorRecord,
    TelemetryDelta, ValveRecord,
};
use crate::resolve::resolve_surface;
use crate::stream::Surface;

// ── Faults and reports ───────────────────────────────────────────────

/// Telemetry that could not be applied as sent.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum DataIntegrityFault {
    #[error("telemetry names unknown device '{name}'")]
    UnknownDevice { name: String },

    #[error("telemetry addresses '{name}' as a {addressed} but it is mapped as a {mapped}")]
    KindMismatch {
        name: String,
        addressed: DeviceKind,
        mapped: DeviceKind,
    },

    #[error("telemetry names '{name}' more than once in one batch")]
    DuplicateDevice { name: String },

    #[error("telemetry carries unreadable {field} '{value}' for '{name}'")]
    InvalidValue {
        name: String,
        field: &'static str,
        value: String,
    },
}

/// Outcome of applying one delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Entries that matched a record.
    pub applied: usize,
    /// Records whose fields actually changed.
    pub changed: usize,
    /// Entries for devices that exist in the configuration but not on
    /// this board.
    pub out_of_scope: usize,
    pub faults: Vec<DataIntegrityFault>,
}

impl MergeReport {
    pub fn has_changes(&self) -> bool {
        self.changed > 0
    }

    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

// ── Free-standing merge ──────────────────────────────────────────────

/// Apply `delta` to `records`, locating each target by name.
pub fn apply(delta: &TelemetryDelta, records: &mut [DeviceRecord]) -> MergeReport {
    let index = build_index(records);
    merge(delta, records, &index, None)
}

// ── DeviceBoard ──────────────────────────────────────────────────────

/// A surface's resolved records plus a name → position index built once
/// at resolve time.
#[derive(Debug, Clone, Default)]
pub struct DeviceBoard {
    records: Vec<DeviceRecord>,
    index: HashMap<String, usize>,
    /// Names that belong to the active configuration but not to this
    /// board. Telemetry for them is expected and silently skipped.
    elsewhere: HashSet<String>,
}

impl DeviceBoard {
    pub fn new(records: Vec<DeviceRecord>) -> Self {
        let index = build_index(&records);
        Self {
            records,
            index,
            elsewhere: HashSet::new(),
        }
    }

    /// Resolve the board a surface shows from `configuration`.
    pub fn for_surface(configuration: Option<&Configuration>, surface: &Surface) -> Self {
        let mut board = Self::new(resolve_surface(configuration, surface));
        if let Some(configuration) = configuration {
            board.elsewhere = configuration
                .mappings
                .iter()
                .filter(|m| !board.index.contains_key(&m.text_id))
                .map(|m| m.text_id.clone())
                .collect();
        }
        board
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn get(&self, name: &str) -> Option<&DeviceRecord> {
        self.index.get(name).and_then(|&i| self.records.get(i))
    }

    pub fn valves(&self) -> impl Iterator<Item = &ValveRecord> {
        self.records.iter().filter_map(DeviceRecord::as_valve)
    }

    pub fn sensors(&self) -> impl Iterator<Item = &SensorRecord> {
        self.records.iter().filter_map(DeviceRecord::as_sensor)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn apply(&mut self, delta: &TelemetryDelta) -> MergeReport {
        merge(delta, &mut self.records, &self.index, Some(&self.elsewhere))
    }
}

// ── Merge core ───────────────────────────────────────────────────────

fn build_index(records: &[DeviceRecord]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        index.entry(record.name().to_owned()).or_insert(i);
    }
    index
}

/// Names that occur more than once, each reported once in first-seen order.
pub(crate) fn repeated_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for name in names {
        let count = counts.entry(name).or_insert(0);
        *count += 1;
        if *count == 2 {
            order.push(name);
        }
    }
    order
}

enum Target<'r> {
    Found(&'r mut DeviceRecord),
    Elsewhere,
    Unknown,
}

fn locate<'r>(
    name: &str,
    records: &'r mut [DeviceRecord],
    index: &HashMap<String, usize>,
    elsewhere: Option<&HashSet<String>>,
) -> Target<'r> {
    let found = match index.get(name) {
        Some(&i) => records.get_mut(i),
        None => None,
    };
    match found {
        Some(record) => Target::Found(record),
        None if elsewhere.is_some_and(|names| names.contains(name)) => Target::Elsewhere,
        None => Target::Unknown,
    }
}

fn merge(
    delta: &TelemetryDelta,
    records: &mut [DeviceRecord],
    index: &HashMap<String, usize>,
    elsewhere: Option<&HashSet<String>>,
) -> MergeReport {
    let mut report = MergeReport::default();

    let valve_repeats = repeated_names(delta.valve_states.iter().map(|(n, _)| n.as_str()));
    let sensor_repeats = repeated_names(delta.sensor_readings.iter().map(|(n, _)| n.as_str()));
    report.faults.extend(
        valve_repeats
            .iter()
            .chain(sensor_repeats.iter())
            .map(|name| DataIntegrityFault::DuplicateDevice {
                name: (*name).to_owned(),
            }),
    );

    for (name, state) in &delta.valve_states {
        if valve_repeats.contains(&name.as_str()) {
            continue;
        }
        match locate(name, records, index, elsewhere) {
            Target::Found(DeviceRecord::Valve(valve)) => {
                report.applied += 1;
                if merge_valve(valve, *state) {
                    report.changed += 1;
                }
            }
            Target::Found(record) => report.faults.push(DataIntegrityFault::KindMismatch {
                name: name.clone(),
                addressed: DeviceKind::Valve,
                mapped: record.kind(),
            }),
            Target::Elsewhere => report.out_of_scope += 1,
            Target::Unknown => report
                .faults
                .push(DataIntegrityFault::UnknownDevice { name: name.clone() }),
        }
    }

    for (name, measurement) in &delta.sensor_readings {
        if sensor_repeats.contains(&name.as_str()) {
            continue;
        }
        match locate(name, records, index, elsewhere) {
            Target::Found(DeviceRecord::Sensor(sensor)) => {
                report.applied += 1;
                if merge_sensor(sensor, measurement) {
                    report.changed += 1;
                }
            }
            Target::Found(record) => report.faults.push(DataIntegrityFault::KindMismatch {
                name: name.clone(),
                addressed: DeviceKind::Sensor,
                mapped: record.kind(),
            }),
            Target::Elsewhere => report.out_of_scope += 1,
            Target::Unknown => report
                .faults
                .push(DataIntegrityFault::UnknownDevice { name: name.clone() }),
        }
    }

    for fault in &report.faults {
        warn!(%fault, "telemetry integrity fault");
    }
    report
}

fn merge_valve(valve: &mut ValveRecord, state: CompositeValveState) -> bool {
    let changed = valve.commanded != state.commanded || valve.actual != state.actual;
    valve.commanded = state.commanded;
    valve.actual = state.actual;
    changed
}

fn merge_sensor(sensor: &mut SensorRecord, measurement: &Measurement) -> bool {
    // Bit comparison so a NaN reading counts as unchanged when repeated.
    let changed =
        sensor.value.to_bits() != measurement.value.to_bits() || sensor.unit != measurement.unit;
    if changed {
        sensor.value = measurement.value;
        sensor.unit.clone_from(&measurement.unit);
    }
    changed
}

// ── Tests ────────────────────────────────────────────────────────────
