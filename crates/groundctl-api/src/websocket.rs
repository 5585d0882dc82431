//! Data-forwarding stream with auto-reconnect.
//!
//! Attaches to the servo server's forwarding endpoint and fans parsed
//! [`ServerFrame`]s out through a [`tokio::sync::broadcast`] channel.
//! Reconnection uses exponential backoff with jitter.
//!
//! # Example
//!
//! ```rust,ignore
//! use groundctl_api::websocket::{FrameStream, ReconnectConfig};
//! use groundctl_api::ServoClient;
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let url = ServoClient::stream_url("10.0.0.5", &forwarding_id)?;
//! let stream = FrameStream::spawn(url, ReconnectConfig::default(), cancel.clone());
//! let mut rx = stream.subscribe();
//!
//! while let Ok(frame) = rx.recv().await {
//!     println!("{frame:?}");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::ServerFrame;

// ── Broadcast channel capacity ───────────────────────────────────────

const FRAME_CHANNEL_CAPACITY: usize = 1024;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 500ms.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 10s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        }
    }
}

// ── FrameStream ──────────────────────────────────────────────────────

/// Handle to a running data stream.
///
/// Dropping the handle does not stop the background task; cancel the
/// token passed to [`spawn`](Self::spawn) or call [`shutdown`](Self::shutdown).
pub struct FrameStream {
    frame_rx: broadcast::Receiver<Arc<ServerFrame>>,
    cancel: CancellationToken,
}

impl FrameStream {
    /// Spawn the reconnection loop for `url`.
    ///
    /// Returns immediately; the first connection attempt happens on the
    /// background task. Must be called from within a Tokio runtime.
    pub fn spawn(url: Url, reconnect: ReconnectConfig, cancel: CancellationToken) -> Self {
        let (frame_tx, frame_rx) = broadcast::channel(FRAME_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            stream_loop(url, frame_tx, reconnect, task_cancel).await;
        });

        Self { frame_rx, cancel }
    }

    /// Get a new broadcast receiver for the frame stream.
    ///
    /// A consumer that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ServerFrame>> {
        self.frame_rx.resubscribe()
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn stream_loop(
    url: Url,
    frame_tx: broadcast::Sender<Arc<ServerFrame>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&url, &frame_tx, &cancel) => {
                match result {
                    // Clean close: reset the counter and reconnect immediately.
                    Ok(()) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        tracing::info!("data stream closed cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "data stream error");

                        if reconnect.max_retries.is_some_and(|max| attempt >= max) {
                            tracing::error!(
                                max_retries = ?reconnect.max_retries,
                                "data stream reconnection limit reached, giving up"
                            );
                            break;
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt = attempt.saturating_add(1);
                    }
                }
            }
        }
    }

    tracing::debug!(url = %url, "data stream loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    frame_tx: &broadcast::Sender<Arc<ServerFrame>>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to data stream");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("data stream connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            message = read.next() => {
                match message {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_broadcast(&text, frame_tx);
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        return match frame {
                            Some(cf) if cf.code != tungstenite::protocol::frame::coding::CloseCode::Normal => {
                                Err(Error::WebSocketClosed {
                                    code: cf.code.into(),
                                    reason: cf.reason.to_string(),
                                })
                            }
                            _ => {
                                tracing::info!("data stream close frame received");
                                Ok(())
                            }
                        };
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("data stream ended");
                        return Ok(());
                    }
                    // Ping is answered by tungstenite; binary and pong are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Parse a text frame and broadcast it. Frames that do not decode at all
/// are dropped with a warning; unreadable entries inside a telemetry frame
/// survive decoding and are reported downstream.
fn parse_and_broadcast(text: &str, frame_tx: &broadcast::Sender<Arc<ServerFrame>>) {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => {
            // No subscribers right now is not an error.
            let _ = frame_tx.send(Arc::new(frame));
        }
        Err(e) => {
            tracing::warn!(error = %e, "dropping undecodable data stream frame");
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
