// ── Domain model ──
//
// Mapping tables, runtime device records, streamed telemetry, and the
// shared session snapshot. Wire shapes live in groundctl-api; `convert`
// translates between the two.

mod device;
mod draft;
mod mapping;
mod sequence;
mod session;
mod snapshot;
mod telemetry;

pub use device::{DeviceKind, DeviceRecord, SensorRecord, ValveRecord, ValveState};
pub use draft::{DraftRow, MappingDraft};
pub use mapping::{Computer, Configuration, MappingEntry, SensorType};
pub use sequence::{ABORT_SEQUENCE, Sequence};
pub use session::{ConnectionState, SessionState};
pub use snapshot::StateSnapshot;
pub use telemetry::{
    CompositeValveState, Measurement, ServerEvent, ServerSession, ServerState, TelemetryDelta,
};
