// ── Runtime controller configuration ──
//
// These types describe how the controller talks to a servo server and how
// it judges liveness. They never touch disk: the CLI (via groundctl-config)
// builds a `ControllerConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use groundctl_api::{ReconnectConfig, TlsMode, TransportConfig};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

/// Backoff policy for the telemetry/state stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReconnect {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for StreamReconnect {
    fn default() -> Self {
        let api = ReconnectConfig::default();
        Self {
            initial_delay: api.initial_delay,
            max_delay: api.max_delay,
            max_retries: api.max_retries,
        }
    }
}

/// Configuration for one controller instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Server address to connect to when none is given explicitly.
    pub server_address: Option<String>,
    /// Upper bound on every remote operation, including `connect`.
    pub command_timeout: Duration,
    /// Heartbeat latency below which a held session counts as connected.
    pub disconnect_threshold_ms: u64,
    /// Feed system the operator normally selects.
    pub default_feedsystem: Option<String>,
    /// Attach to the server's data stream after connecting.
    pub stream_enabled: bool,
    pub reconnect: StreamReconnect,
    pub tls: TlsVerification,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server_address: None,
            command_timeout: Duration::from_secs(5),
            disconnect_threshold_ms: 5_000,
            default_feedsystem: None,
            stream_enabled: true,
            reconnect: StreamReconnect::default(),
            tls: TlsVerification::default(),
        }
    }
}

impl ControllerConfig {
    /// Build the api-level transport settings. The HTTP timeout sits a
    /// little above the command timeout so the controller's own bound
    /// fires first and reports `DispatchError::Timeout`.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: tls_to_transport(&self.tls),
            timeout: self.command_timeout + Duration::from_secs(1),
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: self.reconnect.initial_delay,
            max_delay: self.reconnect.max_delay,
            max_retries: self.reconnect.max_retries,
        }
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
