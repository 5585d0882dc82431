// ── State broadcast bus ──
//
// Fans canonical snapshots out to every subscribed surface. The latest
// snapshot is also kept in an `ArcSwap` so subscribe and `latest()` are
// lock-free reads.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::filter::Surface;
use super::Subscription;
use crate::model::StateSnapshot;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

pub struct StateBus {
    tx: broadcast::Sender<Arc<StateSnapshot>>,
    latest: Arc<ArcSwap<StateSnapshot>>,
    surfaces: Arc<DashMap<Uuid, Surface>>,
}

impl StateBus {
    pub(crate) fn new(initial: StateSnapshot) -> Self {
        let (tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            tx,
            latest: Arc::new(ArcSwap::from_pointee(initial)),
            surfaces: Arc::new(DashMap::new()),
        }
    }

    /// Make `snapshot` the latest and deliver it to every subscriber.
    ///
    /// Callers publish in version order (the store serializes them).
    pub(crate) fn publish(&self, snapshot: Arc<StateSnapshot>) {
        self.latest.store(Arc::clone(&snapshot));
        // No subscribers right now is fine.
        let _ = self.tx.send(snapshot);
    }

    /// Register `surface` and hand back its subscription, already holding
    /// the present snapshot.
    ///
    /// The receiver is created before the snapshot is read, so a publish
    /// racing with this call is either in `current` or queued (and then
    /// skipped as a duplicate version), never lost.
    pub fn subscribe(&self, surface: Surface) -> Subscription {
        let receiver = self.tx.subscribe();
        let current = self.latest.load_full();
        let id = Uuid::new_v4();
        debug!(%surface, version = current.version, "surface subscribed");
        self.surfaces.insert(id, surface.clone());
        Subscription::new(
            id,
            surface,
            current,
            receiver,
            Arc::clone(&self.latest),
            Arc::clone(&self.surfaces),
        )
    }

    pub fn latest(&self) -> Arc<StateSnapshot> {
        self.latest.load_full()
    }

    /// Surfaces currently subscribed, in no particular order.
    pub fn surfaces(&self) -> Vec<Surface> {
        self.surfaces.iter().map(|e| e.value().clone()).collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.surfaces.len()
    }
}
