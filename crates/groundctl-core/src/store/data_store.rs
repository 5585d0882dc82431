// ── Canonical state store ──
//
// Mutations run as short closures under a std mutex that is never held
// across an `.await`. A closure that changed anything marks the state
// dirty; the store then bumps the version and publishes a fresh snapshot
// while still holding the lock, so publish order is version order.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::model::{Configuration, Sequence, SessionState, StateSnapshot};
use crate::stream::{StateBus, Subscription, Surface};

/// The mutable state behind the store. Only reachable inside
/// [`StateStore::update`].
#[derive(Debug, Default)]
pub(crate) struct CanonicalState {
    pub(super) version: u64,
    pub(super) configuration_revision: u64,
    pub(super) epoch: u64,
    /// Epoch whose session was marked lost; only that session may be
    /// revived by activity.
    pub(super) lost_epoch: Option<u64>,
    pub(super) session: SessionState,
    pub(super) configurations: Arc<Vec<Configuration>>,
    pub(super) sequences: Arc<Vec<Sequence>>,
    pub(super) running: Arc<BTreeSet<String>>,
    pub(super) dirty: bool,
}

impl CanonicalState {
    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            version: self.version,
            configuration_revision: self.configuration_revision,
            published_at: Utc::now(),
            session: self.session.clone(),
            configurations: Arc::clone(&self.configurations),
            sequences: Arc::clone(&self.sequences),
            running_sequences: Arc::clone(&self.running),
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn session(&self) -> &SessionState {
        &self.session
    }
}

/// Canonical client-side state plus the bus it publishes on.
pub struct StateStore {
    state: Mutex<CanonicalState>,
    bus: StateBus,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let state = CanonicalState::default();
        let bus = StateBus::new(state.snapshot());
        Self {
            state: Mutex::new(state),
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CanonicalState> {
        // Mutations never panic midway, so a poisoned lock still guards
        // consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one mutation and publish if it changed anything.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut CanonicalState) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        if state.dirty {
            state.dirty = false;
            state.version += 1;
            self.bus.publish(Arc::new(state.snapshot()));
        }
        result
    }

    /// Read canonical state without publishing.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&CanonicalState) -> R) -> R {
        f(&self.lock())
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.bus.latest()
    }

    pub fn session(&self) -> SessionState {
        self.snapshot().session.clone()
    }

    pub fn configurations(&self) -> Arc<Vec<Configuration>> {
        Arc::clone(&self.snapshot().configurations)
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe(&self, surface: Surface) -> Subscription {
        self.bus.subscribe(surface)
    }

    pub fn bus(&self) -> &StateBus {
        &self.bus
    }
}
