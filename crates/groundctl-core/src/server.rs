// ── Remote server seam ──
//
// Everything the controller needs from the servo server. `ServoClient`
// is the production implementation; tests drive the controller with an
// in-memory fake.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use groundctl_api::{ConnectResponse, Error as ApiError, NodeMapping, ServerFrame, ServoClient};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub type FrameReceiver = broadcast::Receiver<Arc<ServerFrame>>;

/// Operations offered by a servo server. Every method takes the server
/// address so one implementation can serve successive connection epochs.
pub trait RemoteServer: Send + Sync + 'static {
    fn connect(&self, address: &str)
    -> impl Future<Output = Result<ConnectResponse, ApiError>> + Send;

    fn get_configurations(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, Vec<NodeMapping>>, ApiError>> + Send;

    fn put_configuration(
        &self,
        address: &str,
        configuration_id: &str,
        mappings: &[NodeMapping],
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn set_active_configuration(
        &self,
        address: &str,
        configuration_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn set_active_feedsystem(
        &self,
        address: &str,
        feedsystem: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn run_sequence(
        &self,
        address: &str,
        name: &str,
        override_checks: bool,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn stop_sequence(
        &self,
        address: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn abort(&self, address: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn submit_sequence(
        &self,
        address: &str,
        name: &str,
        encoded_script: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Attach to the telemetry/state stream for `forwarding_id`. The
    /// stream runs until `cancel` fires.
    fn open_stream(
        &self,
        address: &str,
        forwarding_id: &str,
        cancel: CancellationToken,
    ) -> Result<FrameReceiver, ApiError>;
}

impl RemoteServer for ServoClient {
    fn connect(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<ConnectResponse, ApiError>> + Send {
        ServoClient::connect(self, address)
    }

    fn get_configurations(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, Vec<NodeMapping>>, ApiError>> + Send {
        ServoClient::get_configurations(self, address)
    }

    fn put_configuration(
        &self,
        address: &str,
        configuration_id: &str,
        mappings: &[NodeMapping],
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        ServoClient::put_configuration(self, address, configuration_id, mappings)
    }

    fn set_active_configuration(
        &self,
        address: &str,
        configuration_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        ServoClient::set_active_configuration(self, address, configuration_id)
    }

    fn set_active_feedsystem(
        &self,
        address: &str,
        feedsystem: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        ServoClient::set_active_feedsystem(self, address, feedsystem)
    }

    fn run_sequence(
        &self,
        address: &str,
        name: &str,
        override_checks: bool,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        ServoClient::run_sequence(self, address, name, override_checks)
    }

    fn stop_sequence(
        &self,
        address: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        ServoClient::stop_sequence(self, address, name)
    }

    fn abort(&self, address: &str) -> impl Future<Output = Result<(), ApiError>> + Send {
        ServoClient::abort(self, address)
    }

    fn submit_sequence(
        &self,
        address: &str,
        name: &str,
        encoded_script: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        ServoClient::submit_sequence(self, address, name, encoded_script)
    }

    fn open_stream(
        &self,
        address: &str,
        forwarding_id: &str,
        cancel: CancellationToken,
    ) -> Result<FrameReceiver, ApiError> {
        ServoClient::open_stream(self, address, forwarding_id, cancel)
    }
}
