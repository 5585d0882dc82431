use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::device::ValveState;
use super::mapping::Configuration;
use super::sequence::Sequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeValveState {
    pub commanded: ValveState,
    pub actual: ValveState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub unit: String,
}

/// One streamed batch of device updates.
///
/// Entries are kept as ordered pairs rather than maps: a batch that
/// names the same device twice must reach the merge engine intact so it
/// can be reported instead of collapsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryDelta {
    pub valve_states: Vec<(String, CompositeValveState)>,
    pub sensor_readings: Vec<(String, Measurement)>,
    pub sequences_running: BTreeSet<String>,
}

impl TelemetryDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_valve(
        mut self,
        name: impl Into<String>,
        commanded: ValveState,
        actual: ValveState,
    ) -> Self {
        self.valve_states
            .push((name.into(), CompositeValveState { commanded, actual }));
        self
    }

    pub fn with_sensor(mut self, name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        self.sensor_readings.push((
            name.into(),
            Measurement {
                value,
                unit: unit.into(),
            },
        ));
        self
    }

    pub fn with_running(mut self, sequence: impl Into<String>) -> Self {
        self.sequences_running.insert(sequence.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.valve_states.is_empty() && self.sensor_readings.is_empty()
    }
}

/// Identity the server reports for the session it is serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSession {
    pub session_id: String,
    pub forwarding_id: String,
    pub self_address: Option<String>,
    pub self_port: Option<u16>,
}

/// Authoritative server state. Always safe to replace local state with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    pub session: Option<ServerSession>,
    pub configurations: Vec<Configuration>,
    pub sequences: Vec<Sequence>,
    pub active_configuration_id: Option<String>,
    pub active_feedsystem: Option<String>,
}

/// Anything the server pushes to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Telemetry(TelemetryDelta),
    State(ServerState),
}
