// ── Reactive state streams ──
//
// Subscription types for consuming canonical-state snapshots from the
// state bus, plus the surface identity and filter types.

mod bus;
mod filter;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures_core::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

pub use bus::StateBus;
pub use filter::{SensorFilter, Surface, SurfaceKind};

use crate::model::StateSnapshot;

/// A surface's subscription to the canonical state.
///
/// Provides the snapshot captured at subscribe time and push-style change
/// notification via [`changed`](Self::changed) or by converting into a
/// `Stream`. Snapshots arrive in publish order; versions at or below the
/// one already seen are skipped, and a subscriber that falls behind jumps
/// straight to the latest snapshot. Dropping the subscription removes the
/// surface from the bus registry.
pub struct Subscription {
    id: Uuid,
    surface: Surface,
    current: Arc<StateSnapshot>,
    receiver: broadcast::Receiver<Arc<StateSnapshot>>,
    latest: Arc<ArcSwap<StateSnapshot>>,
    registry: Arc<DashMap<Uuid, Surface>>,
}

impl Subscription {
    pub(crate) fn new(
        id: Uuid,
        surface: Surface,
        current: Arc<StateSnapshot>,
        receiver: broadcast::Receiver<Arc<StateSnapshot>>,
        latest: Arc<ArcSwap<StateSnapshot>>,
        registry: Arc<DashMap<Uuid, Surface>>,
    ) -> Self {
        Self {
            id,
            surface,
            current,
            receiver,
            latest,
            registry,
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// The most recent snapshot this subscriber has seen.
    pub fn current(&self) -> &Arc<StateSnapshot> {
        &self.current
    }

    /// The latest published snapshot (may be newer than `current`).
    pub fn latest(&self) -> Arc<StateSnapshot> {
        self.latest.load_full()
    }

    /// Wait for the next newer snapshot. Returns `None` once the bus is
    /// gone.
    pub async fn changed(&mut self) -> Option<Arc<StateSnapshot>> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => {
                    if snapshot.version > self.current.version {
                        self.current = Arc::clone(&snapshot);
                        return Some(snapshot);
                    }
                    debug!(
                        surface = %self.surface,
                        version = snapshot.version,
                        "skipping stale snapshot"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(surface = %self.surface, skipped, "subscriber lagged, resyncing");
                    let snapshot = self.latest.load_full();
                    if snapshot.version > self.current.version {
                        self.current = Arc::clone(&snapshot);
                        return Some(snapshot);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> SnapshotStream {
        let inner = futures_util::stream::unfold(self, |mut sub| async move {
            sub.changed().await.map(|snapshot| (snapshot, sub))
        });
        SnapshotStream {
            inner: Box::pin(inner),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

/// `Stream` adapter over a [`Subscription`].
pub struct SnapshotStream {
    inner: Pin<Box<dyn Stream<Item = Arc<StateSnapshot>> + Send>>,
}

impl Stream for SnapshotStream {
    type Item = Arc<StateSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
