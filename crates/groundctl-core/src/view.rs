// ── Per-surface device views ──
//
// A surface owns a private copy of its resolved device records. The copy
// is rebuilt from one consistent snapshot whenever the configuration
// revision moves, and telemetry is merged into it in arrival order.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::merge::{DeviceBoard, MergeReport};
use crate::model::{StateSnapshot, TelemetryDelta};
use crate::store::TelemetryCache;
use crate::stream::{Subscription, Surface};

// ── SurfaceView ──────────────────────────────────────────────────────

/// Device records and running-sequence set for one surface.
#[derive(Debug, Clone)]
pub struct SurfaceView {
    surface: Surface,
    board: DeviceBoard,
    configuration_revision: Option<u64>,
    running: Arc<BTreeSet<String>>,
}

impl SurfaceView {
    pub fn new(surface: Surface) -> Self {
        Self {
            surface,
            board: DeviceBoard::default(),
            configuration_revision: None,
            running: Arc::default(),
        }
    }

    /// Bring the view up to `snapshot`. Returns `true` when the device
    /// records were rebuilt, which resets every record to its seed.
    pub fn sync(&mut self, snapshot: &StateSnapshot) -> bool {
        self.running = Arc::clone(&snapshot.running_sequences);
        if self.configuration_revision == Some(snapshot.configuration_revision) {
            return false;
        }
        self.board = DeviceBoard::for_surface(snapshot.active_configuration(), &self.surface);
        self.configuration_revision = Some(snapshot.configuration_revision);
        debug!(
            surface = %self.surface,
            revision = snapshot.configuration_revision,
            devices = self.board.len(),
            "surface rebuilt"
        );
        true
    }

    /// Point the view at another board. Records are rebuilt on the next
    /// [`sync`](Self::sync).
    pub fn set_surface(&mut self, surface: Surface) {
        self.surface = surface;
        self.configuration_revision = None;
    }

    pub fn apply(&mut self, delta: &TelemetryDelta) -> MergeReport {
        self.board.apply(delta)
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn board(&self) -> &DeviceBoard {
        &self.board
    }

    pub fn running(&self) -> &BTreeSet<String> {
        &self.running
    }

    pub fn is_running(&self, sequence: &str) -> bool {
        self.running.contains(sequence)
    }
}

// ── SurfaceSession ───────────────────────────────────────────────────

/// What changed in a [`SurfaceSession`].
#[derive(Debug, Clone)]
pub enum SurfaceUpdate {
    /// A new canonical snapshot arrived.
    State {
        rebuilt: bool,
        snapshot: Arc<StateSnapshot>,
    },
    /// A telemetry delta was merged.
    Telemetry(MergeReport),
    /// The telemetry receiver fell behind; the view was refreshed from the
    /// latest cached values.
    Resynced(MergeReport),
}

/// A live surface: its view plus the state and telemetry feeds that keep
/// it current. Obtained from `Controller::open_surface`.
pub struct SurfaceSession {
    view: SurfaceView,
    state: Subscription,
    telemetry: broadcast::Receiver<Arc<TelemetryDelta>>,
    cache: Arc<TelemetryCache>,
}

impl SurfaceSession {
    pub(crate) fn new(
        state: Subscription,
        telemetry: broadcast::Receiver<Arc<TelemetryDelta>>,
        cache: Arc<TelemetryCache>,
    ) -> Self {
        let mut view = SurfaceView::new(state.surface().clone());
        view.sync(state.current());
        view.apply(&cache.as_delta());
        Self {
            view,
            state,
            telemetry,
            cache,
        }
    }

    pub fn view(&self) -> &SurfaceView {
        &self.view
    }

    /// The snapshot the view currently reflects.
    pub fn snapshot(&self) -> &Arc<StateSnapshot> {
        self.state.current()
    }

    /// Wait for the next change and fold it into the view. Returns `None`
    /// once the controller is gone.
    pub async fn next(&mut self) -> Option<SurfaceUpdate> {
        tokio::select! {
            snapshot = self.state.changed() => {
                let snapshot = snapshot?;
                let rebuilt = self.view.sync(&snapshot);
                if rebuilt {
                    self.view.apply(&self.cache.as_delta());
                }
                Some(SurfaceUpdate::State { rebuilt, snapshot })
            }
            delta = self.telemetry.recv() => match delta {
                Ok(delta) => Some(SurfaceUpdate::Telemetry(self.view.apply(&delta))),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(surface = %self.view.surface(), skipped, "telemetry lagged, resyncing from cache");
                    Some(SurfaceUpdate::Resynced(self.view.apply(&self.cache.as_delta())))
                }
                Err(RecvError::Closed) => None,
            },
        }
    }
}
