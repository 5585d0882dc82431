// Wire types for the servo operator API and the data-forwarding stream.
//
// These mirror the JSON the server speaks, field for field. Enumerated
// values (sensor types, valve states, computers) stay as strings here;
// `groundctl-core` owns their parsing and reports unreadable values as
// data-integrity faults instead of failing the whole frame.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Mappings ─────────────────────────────────────────────────────────

/// One channel mapping as stored on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMapping {
    pub text_id: String,
    pub board_id: String,
    pub sensor_type: String,
    pub channel: u32,
    pub computer: String,

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

/// Body of `POST /operator/mappings`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct PutConfigurationRequest<'a> {
    pub configuration_id: &'a str,
    pub mappings: &'a [NodeMapping],
}

/// Body of `POST /operator/active-configuration`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ActiveConfigurationRequest<'a> {
    pub configuration_id: &'a str,
}

/// Body of `POST /operator/feedsystem`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct FeedsystemRequest<'a> {
    pub feedsystem: &'a str,
}

// ── Sequences ────────────────────────────────────────────────────────

/// Body of `POST /operator/run-sequence`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunSequenceRequest<'a> {
    pub name: &'a str,
    #[serde(rename = "override")]
    pub override_checks: bool,
}

/// Body of `POST /operator/stop-sequence`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StopSequenceRequest<'a> {
    pub name: &'a str,
}

/// Body of `PUT /operator/sequence`. `script` is base64-encoded.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SubmitSequenceRequest<'a> {
    pub name: &'a str,
    pub script: &'a str,
}

// ── Session ──────────────────────────────────────────────────────────

/// Response of `POST /operator/connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub session_id: String,
    pub forwarding_id: String,
    #[serde(default)]
    pub self_address: Option<String>,
    #[serde(default)]
    pub self_port: Option<u16>,
}

// ── Stream frames ────────────────────────────────────────────────────

/// A frame pushed over the data-forwarding stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Telemetry(TelemetryFrame),
    State(StateFrame),
}

/// Partial telemetry: only the devices that changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(default)]
    pub valve_states: KeyedEntries<WireEntry<ValveStatePayload>>,
    #[serde(default)]
    pub sensor_readings: KeyedEntries<WireEntry<MeasurementPayload>>,
    #[serde(default)]
    pub sequences_running: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValveStatePayload {
    pub commanded: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPayload {
    pub value: f64,
    pub unit: String,
}

/// One telemetry entry as sent. An entry that does not have the expected
/// shape (a `null` reading, a missing field) is kept as raw JSON so the
/// rest of the frame still decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireEntry<T> {
    Parsed(T),
    Unreadable(serde_json::Value),
}

impl<T> From<T> for WireEntry<T> {
    fn from(payload: T) -> Self {
        Self::Parsed(payload)
    }
}

/// Authoritative server state, pushed on change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFrame {
    #[serde(default)]
    pub session: Option<SessionPayload>,
    #[serde(default)]
    pub configs: Vec<ConfigurationPayload>,
    #[serde(default)]
    pub sequences: Vec<SequencePayload>,
    #[serde(default)]
    pub active_configuration: Option<String>,
    #[serde(default)]
    pub feedsystem: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub session_id: String,
    pub forwarding_id: String,
    #[serde(default)]
    pub self_address: Option<String>,
    #[serde(default)]
    pub self_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationPayload {
    pub id: String,
    pub mappings: Vec<NodeMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePayload {
    pub name: String,
    pub script: String,
}

// ── KeyedEntries ─────────────────────────────────────────────────────

/// A JSON object decoded as an ordered list of `(key, value)` pairs.
///
/// Unlike a `HashMap`, repeated keys survive decoding, so a frame that
/// names the same device twice can be detected downstream rather than
/// silently collapsed to the last value.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedEntries<T>(pub Vec<(String, T)>);

impl<T> Default for KeyedEntries<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> KeyedEntries<T> {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<T> FromIterator<(String, T)> for KeyedEntries<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Serialize> Serialize for KeyedEntries<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for KeyedEntries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = KeyedEntries<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object keyed by device name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(KeyedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn telemetry_frame_keeps_repeated_device_names() {
        let raw = r#"{
            "type": "telemetry",
            "valve_states": {
                "FV01": { "commanded": "open", "actual": "open" },
                "FV01": { "commanded": "closed", "actual": "closed" }
            },
            "sensor_readings": { "PT01": { "value": 101.5, "unit": "psi" } },
            "sequences_running": ["press"]
        }"#;

        let frame: ServerFrame = serde_json::from_str(raw).unwrap();
        let ServerFrame::Telemetry(telemetry) = frame else {
            panic!("expected telemetry frame");
        };

        let names: Vec<&str> = telemetry.valve_states.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["FV01", "FV01"]);
        assert_eq!(telemetry.sensor_readings.len(), 1);
        assert_eq!(telemetry.sequences_running, vec!["press".to_string()]);
    }

    #[test]
    fn unreadable_reading_does_not_sink_the_frame() {
        let raw = r#"{
            "type": "telemetry",
            "valve_states": { "FV01": { "commanded": "open", "actual": "open" } },
            "sensor_readings": {
                "PT01": { "value": 12.5, "unit": "psi" },
                "PT02": { "value": null, "unit": "psi" }
            }
        }"#;

        let frame: ServerFrame = serde_json::from_str(raw).unwrap();
        let ServerFrame::Telemetry(telemetry) = frame else {
            panic!("expected telemetry frame");
        };

        assert!(matches!(
            telemetry.valve_states.iter().next(),
            Some(("FV01", WireEntry::Parsed(_)))
        ));
        let readings: Vec<_> = telemetry.sensor_readings.iter().collect();
        assert!(matches!(readings[0], ("PT01", WireEntry::Parsed(p)) if p.unit == "psi"));
        assert!(matches!(
            readings[1],
            ("PT02", WireEntry::Unreadable(v)) if v["value"].is_null()
        ));
    }

    #[test]
    fn telemetry_frame_fields_default_when_absent() {
        let frame: ServerFrame = serde_json::from_str(r#"{"type":"telemetry"}"#).unwrap();
        assert_eq!(frame, ServerFrame::Telemetry(TelemetryFrame::default()));
    }

    #[test]
    fn node_mapping_defaults_calibration() {
        let raw = r#"{
            "text_id": "PT01", "board_id": "sam-01", "sensor_type": "pt",
            "channel": 3, "computer": "flight"
        }"#;
        let mapping: NodeMapping = serde_json::from_str(raw).unwrap();
        assert!(mapping.calibrated_offset.abs() < f64::EPSILON);
        assert_eq!(mapping.max, None);
        assert_eq!(mapping.normally_closed, None);

        let echoed = serde_json::to_value(&mapping).unwrap();
        assert!(echoed.get("max").is_none());
        assert_eq!(echoed["calibrated_offset"], 0.0);
    }

    #[test]
    fn run_sequence_body_uses_override_key() {
        let body = RunSequenceRequest {
            name: "press",
            override_checks: true,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, serde_json::json!({ "name": "press", "override": true }));
    }

    #[test]
    fn state_frame_parses_partial_payload() {
        let raw = r#"{
            "type": "state",
            "configs": [{ "id": "cfg-a", "mappings": [] }],
            "active_configuration": "cfg-a"
        }"#;
        let ServerFrame::State(state) = serde_json::from_str(raw).unwrap() else {
            panic!("expected state frame");
        };
        assert_eq!(state.configs.len(), 1);
        assert_eq!(state.active_configuration.as_deref(), Some("cfg-a"));
        assert!(state.session.is_none());
        assert!(state.sequences.is_empty());
    }
}
