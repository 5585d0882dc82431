// ── Latest-value telemetry cache ──
//
// Keeps the most recent valve state and measurement per device name so a
// surface that rebuilds its board (configuration change, lagged receiver)
// can be brought back to current values without waiting for the server to
// resend everything.

use dashmap::DashMap;
use tracing::debug;

use crate::merge::repeated_names;
use crate::model::{CompositeValveState, Measurement, TelemetryDelta};

#[derive(Debug, Default)]
pub struct TelemetryCache {
    valves: DashMap<String, CompositeValveState>,
    sensors: DashMap<String, Measurement>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a delta into the cache. Names repeated inside the delta are
    /// ambiguous and left at their previous value.
    pub fn record(&self, delta: &TelemetryDelta) {
        let repeated_valves = repeated_names(delta.valve_states.iter().map(|(n, _)| n.as_str()));
        for (name, state) in &delta.valve_states {
            if !repeated_valves.contains(&name.as_str()) {
                self.valves.insert(name.clone(), *state);
            }
        }

        let repeated_sensors =
            repeated_names(delta.sensor_readings.iter().map(|(n, _)| n.as_str()));
        for (name, reading) in &delta.sensor_readings {
            if !repeated_sensors.contains(&name.as_str()) {
                self.sensors.insert(name.clone(), reading.clone());
            }
        }
    }

    /// Everything cached, as one delta sorted by name.
    pub fn as_delta(&self) -> TelemetryDelta {
        let mut valve_states: Vec<_> = self
            .valves
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        valve_states.sort_by(|a, b| a.0.cmp(&b.0));

        let mut sensor_readings: Vec<_> = self
            .sensors
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        sensor_readings.sort_by(|a, b| a.0.cmp(&b.0));

        TelemetryDelta {
            valve_states,
            sensor_readings,
            ..TelemetryDelta::default()
        }
    }

    pub fn len(&self) -> usize {
        self.valves.len() + self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valves.is_empty() && self.sensors.is_empty()
    }

    pub fn clear(&self) {
        debug!(entries = self.len(), "clearing telemetry cache");
        self.valves.clear();
        self.sensors.clear();
    }
}
