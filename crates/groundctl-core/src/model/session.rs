use serde::{Deserialize, Serialize};
use strum::Display;

/// Connection state machine.
///
/// `Disconnected → Connecting → Connected → Disconnected`. There is no
/// `Connected → Connecting` edge: a reconnect drops to `Disconnected`
/// first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Connection identity and operator selections for the current epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub server_address: Option<String>,
    pub connection: ConnectionState,
    pub session_id: Option<String>,
    pub forwarding_id: Option<String>,
    pub self_address: Option<String>,
    pub self_port: Option<u16>,
    /// Latest heartbeat latency reported by the activity monitor.
    pub activity_latency_ms: Option<u64>,
    pub active_feedsystem: Option<String>,
    pub active_configuration_id: Option<String>,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }
}
