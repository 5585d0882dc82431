// Operator API HTTP client
//
// Wraps `reqwest::Client` with servo-specific URL construction and
// acknowledgement handling. Every call names the server address it
// targets; the client itself is stateless beyond its HTTP pool, so one
// instance can follow the operator from server to server.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{
    ActiveConfigurationRequest, ConnectResponse, FeedsystemRequest, NodeMapping,
    PutConfigurationRequest, RunSequenceRequest, ServerFrame, StopSequenceRequest,
    SubmitSequenceRequest,
};
use crate::transport::TransportConfig;
use crate::websocket::{FrameStream, ReconnectConfig};

/// Port the servo server listens on when the address does not name one.
pub const DEFAULT_PORT: u16 = 7200;

/// HTTP client for the servo operator API.
#[derive(Debug, Clone)]
pub struct ServoClient {
    http: reqwest::Client,
    reconnect: ReconnectConfig,
}

impl ServoClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(transport.build_client()?))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Replace the reconnection policy used by [`open_stream`](Self::open_stream).
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Turn an operator-typed address into the server's base URL.
    ///
    /// Bare hosts (`10.0.0.5`, `stand.local`) get `http://` and port
    /// [`DEFAULT_PORT`]. Anything carrying a scheme is taken as written.
    pub fn base_url(address: &str) -> Result<Url, Error> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidAddress(address.to_owned()));
        }

        let explicit_scheme = trimmed.contains("://");
        let raw = if explicit_scheme {
            trimmed.to_owned()
        } else {
            format!("http://{trimmed}")
        };

        let mut url = Url::parse(&raw)?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::InvalidAddress(address.to_owned()));
        }
        if !explicit_scheme && url.port().is_none() {
            url.set_port(Some(DEFAULT_PORT))
                .map_err(|()| Error::InvalidAddress(address.to_owned()))?;
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Build a full URL for an operator API path: `{base}/operator/{path}`.
    pub(crate) fn operator_url(address: &str, path: &str) -> Result<Url, Error> {
        Ok(Self::base_url(address)?.join(&format!("operator/{path}"))?)
    }

    /// Build the data-forwarding stream URL for a session.
    pub fn stream_url(address: &str, forwarding_id: &str) -> Result<Url, Error> {
        let mut url = Self::base_url(address)?.join("data/forward")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| Error::InvalidAddress(address.to_owned()))?;
        url.query_pairs_mut()
            .append_pair("forwarding_id", forwarding_id);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        let body = Self::accepted(resp).await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!("POST {}", url);
        let resp = self.http.post(url).json(body).send().await?;
        let body = Self::accepted(resp).await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    async fn post_ack(&self, url: Url, body: Option<&impl Serialize>) -> Result<(), Error> {
        debug!("POST {}", url);
        let mut request = self.http.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::accepted(request.send().await?).await.map(drop)
    }

    async fn put_ack(&self, url: Url, body: &impl Serialize) -> Result<(), Error> {
        debug!("PUT {}", url);
        let resp = self.http.put(url).json(body).send().await?;
        Self::accepted(resp).await.map(drop)
    }

    /// Any 2xx is an acknowledgement. Anything else is a rejection whose
    /// reason is the body text.
    async fn accepted(resp: reqwest::Response) -> Result<String, Error> {
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            return Ok(body);
        }

        let reason = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("no reason given")
                .to_owned()
        } else {
            body
        };
        debug!(status = status.as_u16(), %reason, "request rejected");
        Err(Error::Rejected {
            status: status.as_u16(),
            reason,
        })
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Open an operator session. The server answers with the ids needed to
    /// attach to its data stream.
    pub async fn connect(&self, address: &str) -> Result<ConnectResponse, Error> {
        let url = Self::operator_url(address, "connect")?;
        self.post_json(url, &serde_json::json!({})).await
    }

    /// Attach to the data-forwarding stream. Frames arrive on the returned
    /// receiver until `cancel` fires or the reconnection budget runs out.
    pub fn open_stream(
        &self,
        address: &str,
        forwarding_id: &str,
        cancel: CancellationToken,
    ) -> Result<broadcast::Receiver<std::sync::Arc<ServerFrame>>, Error> {
        let url = Self::stream_url(address, forwarding_id)?;
        Ok(FrameStream::spawn(url, self.reconnect.clone(), cancel).subscribe())
    }

    // ── Configurations ───────────────────────────────────────────────

    /// Fetch every stored configuration, keyed by id.
    pub async fn get_configurations(
        &self,
        address: &str,
    ) -> Result<BTreeMap<String, Vec<NodeMapping>>, Error> {
        let url = Self::operator_url(address, "mappings")?;
        self.get_json(url).await
    }

    /// Create or replace a configuration.
    pub async fn put_configuration(
        &self,
        address: &str,
        configuration_id: &str,
        mappings: &[NodeMapping],
    ) -> Result<(), Error> {
        let url = Self::operator_url(address, "mappings")?;
        let body = PutConfigurationRequest {
            configuration_id,
            mappings,
        };
        self.post_ack(url, Some(&body)).await
    }

    /// Make a stored configuration the active one.
    pub async fn set_active_configuration(
        &self,
        address: &str,
        configuration_id: &str,
    ) -> Result<(), Error> {
        let url = Self::operator_url(address, "active-configuration")?;
        self.post_ack(url, Some(&ActiveConfigurationRequest { configuration_id }))
            .await
    }

    /// Select the active feed system.
    pub async fn set_active_feedsystem(&self, address: &str, feedsystem: &str) -> Result<(), Error> {
        let url = Self::operator_url(address, "feedsystem")?;
        self.post_ack(url, Some(&FeedsystemRequest { feedsystem }))
            .await
    }

    // ── Sequences ────────────────────────────────────────────────────

    pub async fn run_sequence(
        &self,
        address: &str,
        name: &str,
        override_checks: bool,
    ) -> Result<(), Error> {
        let url = Self::operator_url(address, "run-sequence")?;
        let body = RunSequenceRequest {
            name,
            override_checks,
        };
        self.post_ack(url, Some(&body)).await
    }

    pub async fn stop_sequence(&self, address: &str, name: &str) -> Result<(), Error> {
        let url = Self::operator_url(address, "stop-sequence")?;
        self.post_ack(url, Some(&StopSequenceRequest { name })).await
    }

    /// Trigger the server's abort sequence.
    pub async fn abort(&self, address: &str) -> Result<(), Error> {
        let url = Self::operator_url(address, "abort")?;
        self.post_ack(url, None::<&()>).await
    }

    /// Store a sequence. `encoded_script` must already be base64.
    pub async fn submit_sequence(
        &self,
        address: &str,
        name: &str,
        encoded_script: &str,
    ) -> Result<(), Error> {
        let url = Self::operator_url(address, "sequence")?;
        let body = SubmitSequenceRequest {
            name,
            script: encoded_script,
        };
        self.put_ack(url, &body).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_default_port() {
        let url = ServoClient::base_url(" 10.0.0.5 ").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.5:7200/");
    }

    #[test]
    fn explicit_port_is_kept() {
        let url = ServoClient::base_url("stand.local:8080").unwrap();
        assert_eq!(url.as_str(), "http://stand.local:8080/");
    }

    #[test]
    fn explicit_scheme_is_taken_as_written() {
        let url = ServoClient::base_url("https://servo.example/api").unwrap();
        assert_eq!(url.as_str(), "https://servo.example/api/");
        let op = ServoClient::operator_url("https://servo.example/api", "abort").unwrap();
        assert_eq!(op.as_str(), "https://servo.example/api/operator/abort");
    }

    #[test]
    fn empty_address_is_invalid() {
        assert!(matches!(
            ServoClient::base_url("   "),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn stream_url_switches_to_websocket_scheme() {
        let url = ServoClient::stream_url("10.0.0.5", "fwd-42").unwrap();
        assert_eq!(url.as_str(), "ws://10.0.0.5:7200/data/forward?forwarding_id=fwd-42");

        let secure = ServoClient::stream_url("https://servo.example", "f").unwrap();
        assert_eq!(secure.scheme(), "wss");
    }
}
