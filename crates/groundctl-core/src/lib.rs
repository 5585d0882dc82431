// groundctl-core: Canonical session state, mapping resolution, telemetry merge,
// and command dispatch shared by every groundctl surface.

pub mod command;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod merge;
pub mod model;
pub mod resolve;
pub mod server;
pub mod store;
pub mod stream;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Ack, Command, CommandResult, Operation};
pub use config::{ControllerConfig, StreamReconnect, TlsVerification};
pub use controller::Controller;
pub use error::{CoreError, DispatchError};
pub use merge::{DataIntegrityFault, DeviceBoard, MergeReport};
pub use resolve::resolve;
pub use server::{FrameReceiver, RemoteServer};
pub use store::{StateStore, TelemetryCache};
pub use stream::{SensorFilter, Subscription, Surface, SurfaceKind};
pub use view::{SurfaceSession, SurfaceUpdate, SurfaceView};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Mapping table
    Computer, Configuration, DraftRow, MappingDraft, MappingEntry, SensorType,
    // Runtime devices
    DeviceKind, DeviceRecord, SensorRecord, ValveRecord, ValveState,
    // Streamed data
    CompositeValveState, Measurement, ServerEvent, ServerSession, ServerState, TelemetryDelta,
    // Session and shared state
    ConnectionState, Sequence, SessionState, StateSnapshot,
};
