// ── Wire ↔ domain conversion ──
//
// groundctl-api speaks strings for every enumerated value; this module
// parses them into domain types. Bad mapping rows are dropped with a
// warning, bad telemetry entries become `DataIntegrityFault`s, and the
// rest of the payload still goes through.

use std::collections::BTreeMap;

use groundctl_api::{
    ConnectResponse, KeyedEntries, MeasurementPayload, NodeMapping, ServerFrame, SessionPayload,
    StateFrame, TelemetryFrame, ValveStatePayload, WireEntry,
};
use tracing::warn;

use crate::merge::{DataIntegrityFault, repeated_names};
use crate::model::{
    CompositeValveState, Computer, Configuration, MappingEntry, Measurement, Sequence, SensorType,
    ServerEvent, ServerSession, ServerState, TelemetryDelta, ValveState,
};

// ── Mappings ─────────────────────────────────────────────────────────

pub fn mapping_from_wire(raw: &NodeMapping) -> Result<MappingEntry, String> {
    let sensor_type = SensorType::parse_loose(&raw.sensor_type)
        .ok_or_else(|| format!("unknown sensor type '{}'", raw.sensor_type))?;
    let computer = Computer::parse_loose(&raw.computer)
        .ok_or_else(|| format!("unknown computer '{}'", raw.computer))?;

    Ok(MappingEntry {
        text_id: raw.text_id.clone(),
        board_id: raw.board_id.clone(),
        sensor_type,
        channel: raw.channel,
        computer,
        max: raw.max,
        min: raw.min,
        calibrated_offset: raw.calibrated_offset,
        powered_threshold: raw.powered_threshold,
        normally_closed: raw.normally_closed,
    })
}

pub fn mapping_to_wire(entry: &MappingEntry) -> NodeMapping {
    NodeMapping {
        text_id: entry.text_id.clone(),
        board_id: entry.board_id.clone(),
        sensor_type: entry.sensor_type.to_string(),
        channel: entry.channel,
        computer: entry.computer.to_string(),
        max: entry.max,
        min: entry.min,
        calibrated_offset: entry.calibrated_offset,
        powered_threshold: entry.powered_threshold,
        normally_closed: entry.normally_closed,
    }
}

/// Convert one stored configuration, dropping rows the core cannot read.
pub fn configuration_from_wire(id: &str, raw: &[NodeMapping]) -> Configuration {
    let mappings = raw
        .iter()
        .filter_map(|m| match mapping_from_wire(m) {
            Ok(entry) => Some(entry),
            Err(reason) => {
                warn!(configuration = id, text_id = %m.text_id, %reason, "dropping unreadable mapping");
                None
            }
        })
        .collect();
    Configuration::new(id, mappings)
}

/// Convert the `id → mappings` map the server returns, in id order.
pub fn configurations_from_wire(raw: &BTreeMap<String, Vec<NodeMapping>>) -> Vec<Configuration> {
    raw.iter()
        .map(|(id, mappings)| configuration_from_wire(id, mappings))
        .collect()
}

// ── Session ──────────────────────────────────────────────────────────

impl From<ConnectResponse> for ServerSession {
    fn from(resp: ConnectResponse) -> Self {
        Self {
            session_id: resp.session_id,
            forwarding_id: resp.forwarding_id,
            self_address: resp.self_address,
            self_port: resp.self_port,
        }
    }
}

impl From<&SessionPayload> for ServerSession {
    fn from(raw: &SessionPayload) -> Self {
        Self {
            session_id: raw.session_id.clone(),
            forwarding_id: raw.forwarding_id.clone(),
            self_address: raw.self_address.clone(),
            self_port: raw.self_port,
        }
    }
}

// ── Stream frames ────────────────────────────────────────────────────

/// Convert a telemetry frame. Unreadable entries, and every copy of a
/// device named more than once, are left out of the delta and reported.
pub fn telemetry_from_wire(raw: &TelemetryFrame) -> (TelemetryDelta, Vec<DataIntegrityFault>) {
    let mut faults = Vec::new();
    let valve_states = entries_from_wire(&raw.valve_states, valve_state_from_wire, &mut faults);
    let sensor_readings =
        entries_from_wire(&raw.sensor_readings, measurement_from_wire, &mut faults);

    let delta = TelemetryDelta {
        valve_states,
        sensor_readings,
        sequences_running: raw.sequences_running.iter().cloned().collect(),
    };
    (delta, faults)
}

// Repeats are found on the raw names, before unreadable copies drop out.
fn entries_from_wire<T, U>(
    raw: &KeyedEntries<WireEntry<T>>,
    convert: impl Fn(&str, &T) -> Result<U, DataIntegrityFault>,
    faults: &mut Vec<DataIntegrityFault>,
) -> Vec<(String, U)> {
    let repeats = repeated_names(raw.iter().map(|(name, _)| name));
    faults.extend(
        repeats
            .iter()
            .map(|name| DataIntegrityFault::DuplicateDevice {
                name: (*name).to_owned(),
            }),
    );

    raw.iter()
        .filter(|(name, _)| !repeats.contains(name))
        .filter_map(|(name, entry)| {
            let converted = match entry {
                WireEntry::Parsed(payload) => convert(name, payload),
                WireEntry::Unreadable(value) => Err(DataIntegrityFault::InvalidValue {
                    name: name.to_owned(),
                    field: "entry",
                    value: value.to_string(),
                }),
            };
            match converted {
                Ok(value) => Some((name.to_owned(), value)),
                Err(fault) => {
                    faults.push(fault);
                    None
                }
            }
        })
        .collect()
}

fn valve_state_from_wire(
    name: &str,
    raw: &ValveStatePayload,
) -> Result<CompositeValveState, DataIntegrityFault> {
    let parse = |field: &'static str, value: &str| {
        value
            .parse::<ValveState>()
            .map_err(|_| DataIntegrityFault::InvalidValue {
                name: name.to_owned(),
                field,
                value: value.to_owned(),
            })
    };
    Ok(CompositeValveState {
        commanded: parse("commanded", &raw.commanded)?,
        actual: parse("actual", &raw.actual)?,
    })
}

fn measurement_from_wire(
    _name: &str,
    raw: &MeasurementPayload,
) -> Result<Measurement, DataIntegrityFault> {
    Ok(Measurement {
        value: raw.value,
        unit: raw.unit.clone(),
    })
}

pub fn state_from_wire(raw: &StateFrame) -> ServerState {
    ServerState {
        session: raw.session.as_ref().map(ServerSession::from),
        configurations: raw
            .configs
            .iter()
            .map(|c| configuration_from_wire(&c.id, &c.mappings))
            .collect(),
        sequences: raw
            .sequences
            .iter()
            .map(|s| Sequence::new(&s.name, &s.script))
            .collect(),
        active_configuration_id: raw.active_configuration.clone(),
        active_feedsystem: raw.feedsystem.clone(),
    }
}

/// Convert a stream frame, logging any integrity faults it carried.
pub fn event_from_frame(frame: &ServerFrame) -> ServerEvent {
    match frame {
        ServerFrame::Telemetry(raw) => {
            let (delta, faults) = telemetry_from_wire(raw);
            for fault in &faults {
                warn!(%fault, "telemetry integrity fault");
            }
            ServerEvent::Telemetry(delta)
        }
        ServerFrame::State(raw) => ServerEvent::State(state_from_wire(raw)),
    }
}
