// ── Controller abstraction ──
//
// Full lifecycle management for one ground-station session: connection
// epochs, the telemetry/state stream, command dispatch, and reactive
// state through the StateStore.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use groundctl_api::{Error as ApiError, ServoClient};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Ack, Command, CommandResult, Operation};
use crate::config::ControllerConfig;
use crate::convert;
use crate::error::{CoreError, DispatchError};
use crate::model::{
    Configuration, MappingEntry, Sequence, ServerEvent, ServerSession, SessionState,
    StateSnapshot, TelemetryDelta,
};
use crate::server::{FrameReceiver, RemoteServer};
use crate::store::{CanonicalState, StateStore, TelemetryCache};
use crate::stream::{Subscription, Surface};
use crate::view::SurfaceSession;

const TELEMETRY_CHANNEL_SIZE: usize = 256;

type SharedAbort = Shared<BoxFuture<'static, Result<Ack, DispatchError>>>;

// ── Controller ───────────────────────────────────────────────────────

/// The main entry point for surfaces.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Owns the canonical
/// state; every mutation goes through one of its operations.
pub struct Controller<S: RemoteServer = ServoClient> {
    inner: Arc<ControllerInner<S>>,
}

impl<S: RemoteServer> Clone for Controller<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<S> {
    config: ControllerConfig,
    server: S,
    store: StateStore,
    telemetry: Arc<TelemetryCache>,
    telemetry_tx: broadcast::Sender<Arc<TelemetryDelta>>,
    stream: Mutex<Option<StreamHandle>>,
    abort_inflight: Mutex<Option<SharedAbort>>,
    cancel: CancellationToken,
}

/// The ingest task for one connection epoch.
struct StreamHandle {
    epoch: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Controller<ServoClient> {
    /// Build a controller backed by the HTTP client. Does NOT connect.
    pub fn from_config(config: ControllerConfig) -> Result<Self, CoreError> {
        let client = ServoClient::new(&config.transport())
            .map_err(DispatchError::from)?
            .with_reconnect(config.reconnect_config());
        Ok(Self::new(config, client))
    }

    /// One-shot: connect to the configured server, run the closure,
    /// disconnect. The data stream is never opened.
    pub async fn oneshot<F, Fut, T>(config: ControllerConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.stream_enabled = false;
        let address = cfg.server_address.clone().ok_or(CoreError::NotConnected)?;

        let controller = Controller::from_config(cfg)?;
        controller.connect(&address).await?;
        let result = f(controller.clone()).await;
        controller.disconnect();
        result
    }
}

impl<S: RemoteServer> Controller<S> {
    pub fn new(config: ControllerConfig, server: S) -> Self {
        let (telemetry_tx, _) = broadcast::channel(TELEMETRY_CHANNEL_SIZE);
        Self {
            inner: Arc::new(ControllerInner {
                config,
                server,
                store: StateStore::new(),
                telemetry: Arc::new(TelemetryCache::new()),
                telemetry_tx,
                stream: Mutex::new(None),
                abort_inflight: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn server(&self) -> &S {
        &self.inner.server
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect to `address`, starting a new epoch.
    ///
    /// Ids from the previous epoch are cleared and published before the
    /// server is contacted. A result that arrives after a newer `connect`
    /// began is discarded and reported as [`CoreError::Superseded`].
    pub async fn connect(&self, address: &str) -> Result<SessionState, CoreError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(CoreError::validation("server address must not be empty"));
        }

        let epoch = self.inner.store.update(|s| s.begin_connect(address));
        self.stop_stream();
        self.inner.telemetry.clear();
        info!(address, epoch, "connecting to server");

        match self.bounded(self.inner.server.connect(address)).await {
            Ok(response) => {
                let issued = ServerSession::from(response);
                let forwarding_id = issued.forwarding_id.clone();
                if !self.inner.store.update(|s| s.finish_connect(epoch, issued)) {
                    return Err(CoreError::Superseded {
                        address: address.to_owned(),
                    });
                }
                info!(address, epoch, "connected");

                if self.inner.config.stream_enabled {
                    self.start_stream(epoch, address, &forwarding_id);
                }
                Ok(self.session())
            }
            Err(e) => {
                if !self.inner.store.update(|s| s.fail_connect(epoch)) {
                    return Err(CoreError::Superseded {
                        address: address.to_owned(),
                    });
                }
                warn!(address, error = %e, "connect failed");
                Err(e.into())
            }
        }
    }

    /// Operator disconnect: stop the data stream and move to
    /// `Disconnected`. Configuration and device data are kept.
    pub fn disconnect(&self) {
        self.stop_stream();
        self.inner.store.update(CanonicalState::end_session);
        info!("disconnected");
    }

    /// Heartbeat latency from the activity monitor.
    pub fn report_activity(&self, latency_ms: u64) {
        let threshold = self.inner.config.disconnect_threshold_ms;
        self.inner
            .store
            .update(|s| s.record_activity(latency_ms, threshold));
    }

    /// A collaborator decided the connection is lost. Data stays
    /// (stale but present).
    pub fn mark_disconnected(&self) {
        if self.inner.store.update(CanonicalState::mark_disconnected) {
            info!("connection marked lost");
        }
    }

    /// Cancel every background task and wait for the ingest task.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = lock(&self.inner.stream).take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            let _ = handle.task.await;
        }
        debug!("controller shut down");
    }

    // ── Data stream ──────────────────────────────────────────────────

    fn start_stream(&self, epoch: u64, address: &str, forwarding_id: &str) {
        let mut slot = lock(&self.inner.stream);
        // Checked under the stream lock so a newer epoch's stop_stream
        // cannot run between this check and the spawn.
        if self.inner.store.read(CanonicalState::epoch) != epoch {
            debug!(epoch, "epoch superseded before stream start");
            return;
        }
        if let Some(old) = slot.take() {
            old.cancel.cancel();
        }

        let cancel = self.inner.cancel.child_token();
        match self
            .inner
            .server
            .open_stream(address, forwarding_id, cancel.clone())
        {
            Ok(frames) => {
                let task = tokio::spawn(ingest_task(self.clone(), frames, cancel.clone()));
                *slot = Some(StreamHandle {
                    epoch,
                    cancel,
                    task,
                });
            }
            Err(e) => warn!(error = %e, "failed to open data stream"),
        }
    }

    fn stop_stream(&self) {
        if let Some(handle) = lock(&self.inner.stream).take() {
            debug!(epoch = handle.epoch, "stopping data stream");
            handle.cancel.cancel();
        }
    }

    /// Fold one server push into canonical state.
    ///
    /// Telemetry goes to the latest-value cache and out to every open
    /// surface; its running-sequence set replaces the canonical one. A
    /// state push replaces local configuration and sequence state.
    pub fn ingest(&self, event: ServerEvent) {
        match event {
            ServerEvent::Telemetry(delta) => {
                self.inner.telemetry.record(&delta);
                let running = delta.sequences_running.clone();
                self.inner.store.update(|s| s.set_running(running));
                // No open surfaces right now is fine.
                let _ = self.inner.telemetry_tx.send(Arc::new(delta));
            }
            ServerEvent::State(state) => {
                self.inner.store.update(|s| s.apply_server_state(state));
            }
        }
    }

    // ── Command dispatch ─────────────────────────────────────────────

    pub async fn run_sequence(&self, name: &str, override_checks: bool) -> Result<Ack, CoreError> {
        let name = required("sequence name", name)?;
        let address = self.server_address()?;
        self.acknowledged(
            Operation::RunSequence,
            self.inner
                .server
                .run_sequence(&address, name, override_checks),
        )
        .await
    }

    pub async fn stop_sequence(&self, name: &str) -> Result<Ack, CoreError> {
        let name = required("sequence name", name)?;
        let address = self.server_address()?;
        self.acknowledged(
            Operation::StopSequence,
            self.inner.server.stop_sequence(&address, name),
        )
        .await
    }

    /// Trigger the abort sequence.
    ///
    /// Concurrent calls join the request already in flight and share its
    /// outcome. The request runs on its own task, so a caller that gives
    /// up early neither cancels it nor leaves a stale request behind for
    /// the next call to join. Abort needs no running sequence and never
    /// waits behind other commands.
    pub async fn send_abort(&self) -> Result<Ack, CoreError> {
        let address = self.server_address()?;
        self.abort_at(address).await
    }

    /// Trigger the abort sequence on `address` without a session
    /// handshake. Joins any abort already in flight.
    pub async fn send_abort_to(&self, address: &str) -> Result<Ack, CoreError> {
        let address = required("server address", address)?;
        self.abort_at(address.to_owned()).await
    }

    async fn abort_at(&self, address: String) -> Result<Ack, CoreError> {
        let shared = {
            let mut slot = lock(&self.inner.abort_inflight);
            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight abort");
                existing.clone()
            } else {
                let controller = self.clone();
                // The slot lock is held until the handle is stored, so the
                // task cannot clear the slot before it is filled.
                let task = tokio::spawn(async move {
                    let outcome = controller
                        .bounded(controller.inner.server.abort(&address))
                        .await
                        .map(|()| Ack::now(Operation::Abort));
                    *lock(&controller.inner.abort_inflight) = None;
                    outcome
                });
                let request = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(DispatchError::Transport {
                            reason: format!("abort task failed: {e}"),
                        })
                    })
                }
                .boxed()
                .shared();
                *slot = Some(request.clone());
                request
            }
        };

        match shared.await {
            Ok(ack) => {
                info!("abort acknowledged");
                Ok(ack)
            }
            Err(e) => {
                warn!(error = %e, "abort not acknowledged");
                Err(e.into())
            }
        }
    }

    /// Create or replace `configuration` on the server.
    pub async fn send_config(&self, configuration: &Configuration) -> Result<Ack, CoreError> {
        configuration.validate()?;
        let address = self.server_address()?;
        let mappings: Vec<_> = configuration
            .mappings
            .iter()
            .map(convert::mapping_to_wire)
            .collect();
        self.acknowledged(
            Operation::PutConfiguration,
            self.inner
                .server
                .put_configuration(&address, &configuration.id, &mappings),
        )
        .await
    }

    /// Every configuration stored on the server, keyed by id.
    pub async fn get_configs(&self) -> Result<BTreeMap<String, Vec<MappingEntry>>, CoreError> {
        Ok(self
            .fetch_configurations()
            .await?
            .into_iter()
            .map(|c| (c.id, c.mappings))
            .collect())
    }

    /// Fetch configurations and make them the canonical list.
    pub async fn refresh_configs(&self) -> Result<Arc<Vec<Configuration>>, CoreError> {
        let configurations = self.fetch_configurations().await?;
        debug!(count = configurations.len(), "configurations refreshed");
        self.inner
            .store
            .update(|s| s.replace_configurations(configurations));
        Ok(self.inner.store.configurations())
    }

    pub async fn send_active_config(&self, id: &str) -> Result<Ack, CoreError> {
        let id = required("configuration id", id)?;
        let address = self.server_address()?;
        let ack = self
            .acknowledged(
                Operation::SetActiveConfiguration,
                self.inner.server.set_active_configuration(&address, id),
            )
            .await?;
        self.inner.store.update(|s| s.set_active_configuration(id));
        Ok(ack)
    }

    pub async fn send_active_feedsystem(&self, id: &str) -> Result<Ack, CoreError> {
        let id = required("feedsystem", id)?;
        let address = self.server_address()?;
        let ack = self
            .acknowledged(
                Operation::SetActiveFeedsystem,
                self.inner.server.set_active_feedsystem(&address, id),
            )
            .await?;
        self.inner.store.update(|s| s.set_active_feedsystem(id));
        Ok(ack)
    }

    /// Store a sequence script on the server. The script is base64
    /// encoded on the wire.
    pub async fn send_sequence(&self, name: &str, script: &str) -> Result<Ack, CoreError> {
        let name = required("sequence name", name)?;
        let address = self.server_address()?;
        let encoded = Sequence::new(name, script).encoded_script();
        self.acknowledged(
            Operation::SubmitSequence,
            self.inner.server.submit_sequence(&address, name, &encoded),
        )
        .await
    }

    // ── Command routing ──────────────────────────────────────────────

    /// Execute a [`Command`] by routing it to the matching operation.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        match cmd {
            Command::Connect { address } => self.connect(&address).await.map(CommandResult::Session),
            Command::Disconnect => {
                self.disconnect();
                Ok(CommandResult::Disconnected)
            }
            Command::RunSequence {
                name,
                override_checks,
            } => self
                .run_sequence(&name, override_checks)
                .await
                .map(CommandResult::Ack),
            Command::StopSequence { name } => {
                self.stop_sequence(&name).await.map(CommandResult::Ack)
            }
            Command::Abort => self.send_abort().await.map(CommandResult::Ack),
            Command::SubmitSequence { name, script } => self
                .send_sequence(&name, &script)
                .await
                .map(CommandResult::Ack),
            Command::PushConfiguration(configuration) => {
                self.send_config(&configuration).await.map(CommandResult::Ack)
            }
            Command::FetchConfigurations => {
                self.get_configs().await.map(CommandResult::Configurations)
            }
            Command::RefreshConfigurations => self
                .refresh_configs()
                .await
                .map(CommandResult::ConfigurationList),
            Command::ActivateConfiguration { id } => {
                self.send_active_config(&id).await.map(CommandResult::Ack)
            }
            Command::SelectFeedsystem { id } => self
                .send_active_feedsystem(&id)
                .await
                .map(CommandResult::Ack),
        }
    }

    // ── State observation ────────────────────────────────────────────

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.inner.store.snapshot()
    }

    pub fn session(&self) -> SessionState {
        self.inner.store.session()
    }

    /// Subscribe to canonical state. The subscription already holds the
    /// present snapshot.
    pub fn subscribe(&self, surface: Surface) -> Subscription {
        self.inner.store.subscribe(surface)
    }

    /// Raw telemetry deltas as they are ingested.
    pub fn telemetry(&self) -> broadcast::Receiver<Arc<TelemetryDelta>> {
        self.inner.telemetry_tx.subscribe()
    }

    pub fn telemetry_cache(&self) -> &TelemetryCache {
        &self.inner.telemetry
    }

    /// Open a live device view for `surface`, seeded from the present
    /// snapshot and the latest cached telemetry.
    pub fn open_surface(&self, surface: Surface) -> SurfaceSession {
        // Telemetry first: a delta racing with this call is then either
        // in the cache or queued, and merging it twice is harmless.
        let telemetry = self.inner.telemetry_tx.subscribe();
        let state = self.inner.store.subscribe(surface);
        SurfaceSession::new(state, telemetry, Arc::clone(&self.inner.telemetry))
    }

    /// Surfaces currently subscribed.
    pub fn surfaces(&self) -> Vec<Surface> {
        self.inner.store.bus().surfaces()
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn server_address(&self) -> Result<String, CoreError> {
        self.inner
            .store
            .read(|s| s.session().server_address.clone())
            .ok_or(CoreError::NotConnected)
    }

    async fn fetch_configurations(&self) -> Result<Vec<Configuration>, CoreError> {
        let address = self.server_address()?;
        let raw = self
            .bounded(self.inner.server.get_configurations(&address))
            .await?;
        Ok(convert::configurations_from_wire(&raw))
    }

    /// Bound a server call by the command timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, DispatchError> {
        let limit = self.inner.config.command_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(DispatchError::from),
            Err(_) => Err(DispatchError::Timeout {
                timeout_ms: millis(limit),
            }),
        }
    }

    async fn acknowledged(
        &self,
        operation: Operation,
        call: impl Future<Output = Result<(), ApiError>>,
    ) -> Result<Ack, CoreError> {
        let started = Instant::now();
        match self.bounded(call).await {
            Ok(()) => {
                info!(%operation, elapsed_ms = millis(started.elapsed()), "acknowledged");
                Ok(Ack::now(operation))
            }
            Err(e) => {
                warn!(%operation, error = %e, "not acknowledged");
                Err(e.into())
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Pump stream frames into canonical state until cancelled.
async fn ingest_task<S: RemoteServer>(
    controller: Controller<S>,
    mut frames: FrameReceiver,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Ok(frame) => controller.ingest(convert::event_from_frame(&frame)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ingest fell behind the data stream");
                }
                Err(RecvError::Closed) => {
                    info!("data stream ended");
                    controller.mark_disconnected();
                    break;
                }
            },
        }
    }
    debug!("ingest task exiting");
}

// ── Helpers ──────────────────────────────────────────────────────────

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn required<'a>(what: &str, value: &'a str) -> Result<&'a str, CoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::validation(format!("{what} must not be empty")));
    }
    Ok(value)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
