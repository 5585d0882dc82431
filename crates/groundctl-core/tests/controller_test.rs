#![allow(clippy::unwrap_used)]
// Controller scenarios against an in-memory servo server.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use groundctl_api::{ConnectResponse, Error as ApiError, NodeMapping, ServerFrame};
use groundctl_core::{
    Computer, Configuration, ConnectionState, Controller, ControllerConfig, CoreError,
    DispatchError, MappingEntry, RemoteServer, SensorType, ServerEvent, Surface, SurfaceUpdate,
    TelemetryDelta, ValveState,
};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ── Fake server ──────────────────────────────────────────────────────

struct FakeServer {
    calls: Mutex<Vec<String>>,
    connects: AtomicUsize,
    delay: Duration,
    slow: Mutex<BTreeMap<String, Duration>>,
    rejection: Mutex<Option<String>>,
    stored: Mutex<BTreeMap<String, Vec<NodeMapping>>>,
    frames: broadcast::Sender<Arc<ServerFrame>>,
}

impl FakeServer {
    fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Self {
        let (frames, _) = broadcast::channel(64);
        Self {
            calls: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            delay,
            slow: Mutex::new(BTreeMap::new()),
            rejection: Mutex::new(None),
            stored: Mutex::new(BTreeMap::new()),
            frames,
        }
    }

    /// Delay only `op`, overriding the server-wide delay.
    fn slow_down(&self, op: &str, delay: Duration) {
        self.slow.lock().unwrap().insert(op.to_owned(), delay);
    }

    fn reject_with(&self, reason: &str) {
        *self.rejection.lock().unwrap() = Some(reason.to_owned());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == op).count()
    }

    fn push(&self, raw: serde_json::Value) {
        let frame: ServerFrame = serde_json::from_value(raw).unwrap();
        self.frames.send(Arc::new(frame)).unwrap();
    }

    async fn respond(&self, op: &str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(op.to_owned());
        let delay = self
            .slow
            .lock()
            .unwrap()
            .get(op)
            .copied()
            .unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let rejection = self.rejection.lock().unwrap().clone();
        match rejection {
            Some(reason) => Err(ApiError::Rejected {
                status: 409,
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl RemoteServer for FakeServer {
    async fn connect(&self, _address: &str) -> Result<ConnectResponse, ApiError> {
        self.respond("connect").await?;
        let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ConnectResponse {
            session_id: format!("sess-{n}"),
            forwarding_id: format!("fwd-{n}"),
            self_address: Some("10.0.0.100".into()),
            self_port: Some(7201),
        })
    }

    async fn get_configurations(
        &self,
        _address: &str,
    ) -> Result<BTreeMap<String, Vec<NodeMapping>>, ApiError> {
        self.respond("get_configurations").await?;
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn put_configuration(
        &self,
        _address: &str,
        configuration_id: &str,
        mappings: &[NodeMapping],
    ) -> Result<(), ApiError> {
        self.respond("put_configuration").await?;
        self.stored
            .lock()
            .unwrap()
            .insert(configuration_id.to_owned(), mappings.to_vec());
        Ok(())
    }

    async fn set_active_configuration(&self, _address: &str, _id: &str) -> Result<(), ApiError> {
        self.respond("set_active_configuration").await
    }

    async fn set_active_feedsystem(&self, _address: &str, _id: &str) -> Result<(), ApiError> {
        self.respond("set_active_feedsystem").await
    }

    async fn run_sequence(
        &self,
        _address: &str,
        _name: &str,
        _override_checks: bool,
    ) -> Result<(), ApiError> {
        self.respond("run_sequence").await
    }

    async fn stop_sequence(&self, _address: &str, _name: &str) -> Result<(), ApiError> {
        self.respond("stop_sequence").await
    }

    async fn abort(&self, _address: &str) -> Result<(), ApiError> {
        self.respond("abort").await
    }

    async fn submit_sequence(
        &self,
        _address: &str,
        name: &str,
        encoded_script: &str,
    ) -> Result<(), ApiError> {
        self.respond(&format!("submit_sequence:{name}:{encoded_script}"))
            .await
    }

    fn open_stream(
        &self,
        _address: &str,
        _forwarding_id: &str,
        _cancel: CancellationToken,
    ) -> Result<broadcast::Receiver<Arc<ServerFrame>>, ApiError> {
        self.calls.lock().unwrap().push("open_stream".into());
        Ok(self.frames.subscribe())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn config_without_stream() -> ControllerConfig {
    ControllerConfig {
        stream_enabled: false,
        command_timeout: Duration::from_secs(1),
        ..ControllerConfig::default()
    }
}

fn controller(server: FakeServer) -> Controller<FakeServer> {
    Controller::new(config_without_stream(), server)
}

fn config_1() -> Configuration {
    Configuration::new(
        "Config_1",
        vec![MappingEntry::new(
            "FV01",
            "sam",
            SensorType::Valve,
            1,
            Computer::Flight,
        )],
    )
}

// ── Session ──────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_address_is_rejected_without_network_call() {
    let ctrl = controller(FakeServer::new());
    let before = ctrl.snapshot();

    let err = ctrl.connect("   ").await.unwrap_err();

    assert!(matches!(err, CoreError::Validation { .. }));
    assert!(ctrl.server().calls().is_empty());
    assert_eq!(ctrl.snapshot().version, before.version);
    assert_eq!(ctrl.session(), before.session);
}

#[tokio::test]
async fn reconnect_clears_ids_before_adopting_new_ones() {
    let ctrl = controller(FakeServer::new());

    let session = ctrl.connect("10.0.0.5").await.unwrap();
    assert_eq!(session.connection, ConnectionState::Connected);
    assert_eq!(session.session_id.as_deref(), Some("sess-1"));
    assert_eq!(session.forwarding_id.as_deref(), Some("fwd-1"));
    assert_eq!(session.self_port, Some(7201));

    let mut sub = ctrl.subscribe(Surface::new(groundctl_core::SurfaceKind::System, "main"));
    ctrl.connect("10.0.0.6").await.unwrap();

    let connecting = sub.changed().await.unwrap();
    assert_eq!(connecting.session.connection, ConnectionState::Connecting);
    assert_eq!(connecting.session.session_id, None);
    assert_eq!(connecting.session.forwarding_id, None);
    assert_eq!(connecting.session.server_address.as_deref(), Some("10.0.0.6"));

    let connected = sub.changed().await.unwrap();
    assert_eq!(connected.session.connection, ConnectionState::Connected);
    assert_eq!(connected.session.session_id.as_deref(), Some("sess-2"));
    assert!(connected.version > connecting.version);
}

#[tokio::test]
async fn rejected_connect_surfaces_reason_verbatim() {
    let server = FakeServer::new();
    server.reject_with("operator already connected");
    let ctrl = controller(server);

    let err = ctrl.connect("10.0.0.5").await.unwrap_err();

    assert_eq!(
        err.dispatch(),
        Some(&DispatchError::Rejected {
            reason: "operator already connected".into()
        })
    );
    assert_eq!(ctrl.session().connection, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn superseded_connect_is_discarded() {
    let ctrl = Controller::new(
        ControllerConfig {
            command_timeout: Duration::from_secs(30),
            ..config_without_stream()
        },
        FakeServer::with_delay(Duration::from_millis(100)),
    );

    let first = ctrl.connect("10.0.0.5");
    let second = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctrl.connect("10.0.0.6").await
    };
    let (first, second) = tokio::join!(first, second);

    assert!(matches!(first, Err(CoreError::Superseded { .. })));
    let session = second.unwrap();
    assert_eq!(session.server_address.as_deref(), Some("10.0.0.6"));
    assert_eq!(session.session_id.as_deref(), Some("sess-2"));
    assert_eq!(ctrl.session().session_id.as_deref(), Some("sess-2"));
}

#[tokio::test]
async fn activity_revives_a_lost_session_but_data_is_kept() {
    let ctrl = controller(FakeServer::new());
    ctrl.connect("10.0.0.5").await.unwrap();
    ctrl.ingest(ServerEvent::State(groundctl_core::ServerState {
        configurations: vec![config_1()],
        ..Default::default()
    }));

    ctrl.mark_disconnected();
    assert_eq!(ctrl.session().connection, ConnectionState::Disconnected);
    assert_eq!(ctrl.snapshot().configurations.len(), 1);

    ctrl.report_activity(9_000);
    assert_eq!(ctrl.session().connection, ConnectionState::Disconnected);
    ctrl.report_activity(40);
    assert_eq!(ctrl.session().connection, ConnectionState::Connected);
    assert_eq!(ctrl.session().activity_latency_ms, Some(40));
}

#[tokio::test]
async fn heartbeat_after_operator_disconnect_stays_disconnected() {
    let ctrl = controller(FakeServer::new());
    ctrl.connect("10.0.0.5").await.unwrap();

    ctrl.disconnect();
    ctrl.report_activity(10);

    assert_eq!(ctrl.session().connection, ConnectionState::Disconnected);
    assert_eq!(ctrl.session().activity_latency_ms, Some(10));
}

// ── Dispatch ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_aborts_share_one_request() {
    let ctrl = Controller::new(
        config_without_stream(),
        FakeServer::with_delay(Duration::from_millis(50)),
    );
    ctrl.connect("10.0.0.5").await.unwrap();

    let (a, b) = tokio::join!(ctrl.send_abort(), ctrl.send_abort());

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(ctrl.server().count("abort"), 1);

    // Abort stays safe to re-issue once the first one is done.
    ctrl.send_abort().await.unwrap();
    assert_eq!(ctrl.server().count("abort"), 2);
}

#[tokio::test(start_paused = true)]
async fn abandoned_abort_keeps_running_for_the_next_caller() {
    let ctrl = Controller::new(
        ControllerConfig {
            command_timeout: Duration::from_secs(5),
            ..config_without_stream()
        },
        FakeServer::new(),
    );
    ctrl.server().slow_down("abort", Duration::from_secs(2));
    ctrl.connect("10.0.0.5").await.unwrap();

    let gave_up = tokio::time::timeout(Duration::from_millis(100), ctrl.send_abort()).await;
    assert!(gave_up.is_err());

    // The request is still live, so a second call joins it.
    ctrl.send_abort().await.unwrap();
    assert_eq!(ctrl.server().count("abort"), 1);
}

#[tokio::test(start_paused = true)]
async fn abort_after_an_abandoned_timeout_reaches_the_server() {
    let ctrl = Controller::new(
        ControllerConfig {
            command_timeout: Duration::from_secs(5),
            ..config_without_stream()
        },
        FakeServer::new(),
    );
    ctrl.server().slow_down("abort", Duration::from_secs(60));
    ctrl.connect("10.0.0.5").await.unwrap();

    let gave_up = tokio::time::timeout(Duration::from_millis(100), ctrl.send_abort()).await;
    assert!(gave_up.is_err());
    tokio::time::sleep(Duration::from_secs(30)).await;

    ctrl.server().slow_down("abort", Duration::ZERO);
    let started = tokio::time::Instant::now();
    ctrl.send_abort().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(ctrl.server().count("abort"), 2);
}

#[tokio::test(start_paused = true)]
async fn abort_is_not_queued_behind_a_slow_command() {
    let ctrl = Controller::new(
        ControllerConfig {
            command_timeout: Duration::from_secs(60),
            ..config_without_stream()
        },
        FakeServer::new(),
    );
    ctrl.server().slow_down("run_sequence", Duration::from_secs(30));
    ctrl.server().slow_down("put_configuration", Duration::from_secs(30));
    ctrl.connect("10.0.0.5").await.unwrap();

    let run = tokio::spawn({
        let ctrl = ctrl.clone();
        async move { ctrl.run_sequence("press", false).await }
    });
    let push = tokio::spawn({
        let ctrl = ctrl.clone();
        async move { ctrl.send_config(&config_1()).await }
    });
    tokio::task::yield_now().await;

    let started = tokio::time::Instant::now();
    ctrl.send_abort().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!run.is_finished());
    assert!(!push.is_finished());

    run.await.unwrap().unwrap();
    push.await.unwrap().unwrap();
    assert_eq!(ctrl.server().count("abort"), 1);
}

#[tokio::test(start_paused = true)]
async fn abort_to_address_skips_the_handshake() {
    let ctrl = Controller::new(
        ControllerConfig {
            command_timeout: Duration::from_secs(5),
            ..config_without_stream()
        },
        FakeServer::new(),
    );
    ctrl.server().slow_down("connect", Duration::from_secs(60));

    let started = tokio::time::Instant::now();
    ctrl.send_abort_to(" 10.0.0.5 ").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(ctrl.server().calls(), vec!["abort".to_owned()]);
    assert!(matches!(
        ctrl.send_abort_to("  ").await,
        Err(CoreError::Validation { .. })
    ));
}

#[tokio::test]
async fn dispatch_without_server_address_is_not_connected() {
    let ctrl = controller(FakeServer::new());

    assert!(matches!(ctrl.send_abort().await, Err(CoreError::NotConnected)));
    assert!(matches!(
        ctrl.run_sequence("press", false).await,
        Err(CoreError::NotConnected)
    ));
    assert!(ctrl.server().calls().is_empty());
}

#[tokio::test]
async fn invalid_commands_never_reach_the_server() {
    let ctrl = controller(FakeServer::new());
    ctrl.connect("10.0.0.5").await.unwrap();
    let duplicate = Configuration::new(
        "dup",
        vec![
            MappingEntry::new("FV01", "sam", SensorType::Valve, 1, Computer::Flight),
            MappingEntry::new("FV01", "sam", SensorType::Valve, 2, Computer::Flight),
        ],
    );

    assert!(matches!(
        ctrl.run_sequence(" ", true).await,
        Err(CoreError::Validation { .. })
    ));
    assert!(matches!(
        ctrl.send_config(&duplicate).await,
        Err(CoreError::Validation { .. })
    ));
    assert!(matches!(
        ctrl.send_active_config("").await,
        Err(CoreError::Validation { .. })
    ));
    assert_eq!(ctrl.server().calls(), vec!["connect".to_owned()]);
}

#[tokio::test]
async fn send_config_then_get_configs_round_trips() {
    let ctrl = controller(FakeServer::new());
    ctrl.connect("10.0.0.5").await.unwrap();
    let mut cfg = config_1();
    cfg.mappings.push(MappingEntry::new(
        "PT01",
        "sam",
        SensorType::Pt,
        3,
        Computer::Ground,
    ));

    ctrl.send_config(&cfg).await.unwrap();
    let configs = ctrl.get_configs().await.unwrap();

    assert_eq!(configs.get("Config_1"), Some(&cfg.mappings));
}

#[tokio::test]
async fn rejection_reason_is_verbatim() {
    let ctrl = controller(FakeServer::new());
    ctrl.connect("10.0.0.5").await.unwrap();
    ctrl.server().reject_with("sequence 'press' is not defined");

    let err = ctrl.run_sequence("press", false).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Rejected by server: sequence 'press' is not defined"
    );
}

#[tokio::test(start_paused = true)]
async fn slow_server_times_out() {
    let ctrl = Controller::new(
        ControllerConfig {
            command_timeout: Duration::from_secs(2),
            ..config_without_stream()
        },
        FakeServer::with_delay(Duration::from_secs(10)),
    );

    let err = ctrl.connect("10.0.0.5").await.unwrap_err();

    assert_eq!(
        err.dispatch(),
        Some(&DispatchError::Timeout { timeout_ms: 2_000 })
    );
    assert_eq!(ctrl.session().connection, ConnectionState::Disconnected);
}

#[tokio::test]
async fn acknowledged_selections_update_canonical_state() {
    let ctrl = controller(FakeServer::new());
    ctrl.connect("10.0.0.5").await.unwrap();
    let revision = ctrl.snapshot().configuration_revision;

    ctrl.send_active_config("Config_1").await.unwrap();
    ctrl.send_active_feedsystem("Feedsystem_2").await.unwrap();

    let snapshot = ctrl.snapshot();
    assert_eq!(
        snapshot.session.active_configuration_id.as_deref(),
        Some("Config_1")
    );
    assert_eq!(
        snapshot.session.active_feedsystem.as_deref(),
        Some("Feedsystem_2")
    );
    assert!(snapshot.configuration_revision > revision);
}

#[tokio::test]
async fn sequence_script_is_base64_on_the_wire() {
    let ctrl = controller(FakeServer::new());
    ctrl.connect("10.0.0.5").await.unwrap();

    ctrl.send_sequence("hello", "print(1)").await.unwrap();

    assert!(
        ctrl.server()
            .calls()
            .contains(&"submit_sequence:hello:cHJpbnQoMSk=".to_owned())
    );
}

// ── Surfaces and telemetry ───────────────────────────────────────────

#[tokio::test]
async fn fv01_delta_reaches_the_sam_surface() {
    let ctrl = controller(FakeServer::new());
    ctrl.connect("10.0.0.5").await.unwrap();
    ctrl.send_config(&config_1()).await.unwrap();
    ctrl.refresh_configs().await.unwrap();
    ctrl.send_active_config("Config_1").await.unwrap();

    let mut surface = ctrl.open_surface(Surface::sam("sam"));
    let fv01 = surface.view().board().get("FV01").unwrap().as_valve().unwrap().clone();
    assert_eq!(fv01.commanded, ValveState::Closed);
    assert_eq!(fv01.actual, ValveState::Disconnected);

    ctrl.ingest(ServerEvent::Telemetry(TelemetryDelta::new().with_valve(
        "FV01",
        ValveState::Open,
        ValveState::Open,
    )));

    let update = surface.next().await.unwrap();
    let SurfaceUpdate::Telemetry(ref report) = update else {
        panic!("expected telemetry, got {update:?}");
    };
    assert!(report.is_clean());
    assert_eq!(report.changed, 1);

    let after = surface.view().board().get("FV01").unwrap().as_valve().unwrap();
    assert_eq!(after.commanded, ValveState::Open);
    assert_eq!(after.actual, ValveState::Open);
    assert_eq!(after.board_id, fv01.board_id);
    assert_eq!(after.channel, fv01.channel);
    assert_eq!(after.group, fv01.group);
}

#[tokio::test]
async fn unknown_device_is_reported_not_applied() {
    let ctrl = controller(FakeServer::new());
    ctrl.ingest(ServerEvent::State(groundctl_core::ServerState {
        configurations: vec![config_1()],
        active_configuration_id: Some("Config_1".into()),
        ..Default::default()
    }));
    let mut surface = ctrl.open_surface(Surface::sam("sam"));
    let before = surface.view().board().records().to_vec();

    ctrl.ingest(ServerEvent::Telemetry(
        TelemetryDelta::new().with_valve("GHOST", ValveState::Open, ValveState::Open),
    ));

    let Some(SurfaceUpdate::Telemetry(report)) = surface.next().await else {
        panic!("expected telemetry update");
    };
    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.changed, 0);
    assert_eq!(surface.view().board().records(), before.as_slice());
}

#[tokio::test]
async fn stream_frames_flow_into_state_and_surfaces() {
    let ctrl = Controller::new(
        ControllerConfig {
            stream_enabled: true,
            ..config_without_stream()
        },
        FakeServer::new(),
    );
    ctrl.connect("10.0.0.5").await.unwrap();
    assert_eq!(ctrl.server().count("open_stream"), 1);

    let mut sub = ctrl.subscribe(Surface::new(groundctl_core::SurfaceKind::Sequences, "main"));
    ctrl.server().push(serde_json::json!({
        "type": "state",
        "configs": [{
            "id": "Config_1",
            "mappings": [{
                "text_id": "FV01", "board_id": "sam", "sensor_type": "valve",
                "channel": 1, "computer": "FLIGHT"
            }]
        }],
        "active_configuration": "Config_1",
        "feedsystem": "Feedsystem_1"
    }));

    let snapshot = sub.changed().await.unwrap();
    assert_eq!(snapshot.active_configuration(), Some(&config_1()));
    assert_eq!(snapshot.session.active_feedsystem.as_deref(), Some("Feedsystem_1"));

    ctrl.server().push(serde_json::json!({
        "type": "telemetry",
        "valve_states": { "FV01": { "commanded": "open", "actual": "closed" } },
        "sequences_running": ["press"]
    }));
    let snapshot = sub.changed().await.unwrap();
    assert!(snapshot.is_running("press"));

    ctrl.shutdown().await;
}

#[tokio::test]
async fn subscription_starts_with_present_snapshot_and_is_registered() {
    let ctrl = controller(FakeServer::new());
    ctrl.connect("10.0.0.5").await.unwrap();

    let sub = ctrl.subscribe(Surface::sam("sam-01"));
    assert_eq!(sub.current().version, ctrl.snapshot().version);
    assert!(sub.current().session.is_connected());
    assert_eq!(ctrl.surfaces(), vec![Surface::sam("sam-01")]);

    drop(sub);
    assert!(ctrl.surfaces().is_empty());
}
