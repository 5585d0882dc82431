// groundctl-api: Async Rust client for the servo control server (operator API + data stream)

pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::{DEFAULT_PORT, ServoClient};
pub use error::Error;
pub use models::{
    ConfigurationPayload, ConnectResponse, KeyedEntries, MeasurementPayload, NodeMapping,
    SequencePayload, ServerFrame, SessionPayload, StateFrame, TelemetryFrame, ValveStatePayload,
    WireEntry,
};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{FrameStream, ReconnectConfig};
