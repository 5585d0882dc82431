// ── Canonical state mutations ──
//
// The only entry points that change canonical state. Each marks the state
// dirty when something actually changed; `StateStore::update` publishes.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::CanonicalState;
use crate::model::{
    Configuration, ConnectionState, Sequence, ServerSession, ServerState, SessionState,
};

impl CanonicalState {
    // ── Session epochs ───────────────────────────────────────────────

    /// Start a new connection epoch for `address`: forget the previous
    /// session ids and enter `Connecting`. Returns the new epoch.
    pub(crate) fn begin_connect(&mut self, address: &str) -> u64 {
        self.epoch += 1;
        self.lost_epoch = None;
        let session = &mut self.session;
        session.server_address = Some(address.to_owned());
        session.connection = ConnectionState::Connecting;
        session.session_id = None;
        session.forwarding_id = None;
        session.self_address = None;
        session.self_port = None;
        session.activity_latency_ms = None;
        self.dirty = true;
        self.epoch
    }

    /// Adopt the ids the server issued, unless a newer epoch has started.
    pub(crate) fn finish_connect(&mut self, epoch: u64, issued: ServerSession) -> bool {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding superseded connect result");
            return false;
        }
        adopt_session(&mut self.session, issued);
        self.session.connection = ConnectionState::Connected;
        self.dirty = true;
        true
    }

    /// Record a failed connect. Stale failures leave state alone.
    pub(crate) fn fail_connect(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding superseded connect failure");
            return false;
        }
        self.session.connection = ConnectionState::Disconnected;
        self.dirty = true;
        true
    }

    /// Heartbeat from the activity monitor.
    pub(crate) fn record_activity(&mut self, latency_ms: u64, threshold_ms: u64) {
        let session = &mut self.session;
        if session.activity_latency_ms != Some(latency_ms) {
            session.activity_latency_ms = Some(latency_ms);
            self.dirty = true;
        }
        let revive = latency_ms < threshold_ms
            && self.lost_epoch == Some(self.epoch)
            && session.session_id.is_some()
            && session.connection == ConnectionState::Disconnected;
        if revive {
            debug!(latency_ms, "activity back under threshold, session live again");
            session.connection = ConnectionState::Connected;
            self.lost_epoch = None;
            self.dirty = true;
        }
    }

    /// Connection lost (decided by the caller). Data is kept.
    pub(crate) fn mark_disconnected(&mut self) -> bool {
        if self.session.connection != ConnectionState::Connected {
            return false;
        }
        self.session.connection = ConnectionState::Disconnected;
        self.lost_epoch = Some(self.epoch);
        self.dirty = true;
        true
    }

    /// Operator disconnect: end the epoch so an in-flight connect cannot
    /// revive it. Ids stay visible until the next connect.
    pub(crate) fn end_session(&mut self) {
        self.epoch += 1;
        self.lost_epoch = None;
        if self.session.connection != ConnectionState::Disconnected {
            self.session.connection = ConnectionState::Disconnected;
            self.dirty = true;
        }
    }

    // ── Operator selections ──────────────────────────────────────────

    pub(crate) fn set_active_configuration(&mut self, id: &str) {
        if self.session.active_configuration_id.as_deref() != Some(id) {
            self.session.active_configuration_id = Some(id.to_owned());
            self.configuration_revision += 1;
            self.dirty = true;
        }
    }

    pub(crate) fn set_active_feedsystem(&mut self, id: &str) {
        if self.session.active_feedsystem.as_deref() != Some(id) {
            self.session.active_feedsystem = Some(id.to_owned());
            self.dirty = true;
        }
    }

    // ── Bulk replacement ─────────────────────────────────────────────

    pub(crate) fn replace_configurations(&mut self, configurations: Vec<Configuration>) {
        if *self.configurations != configurations {
            self.configurations = Arc::new(configurations);
            self.configuration_revision += 1;
            self.dirty = true;
        }
    }

    pub(crate) fn replace_sequences(&mut self, sequences: Vec<Sequence>) {
        if *self.sequences != sequences {
            self.sequences = Arc::new(sequences);
            self.dirty = true;
        }
    }

    pub(crate) fn set_running(&mut self, running: BTreeSet<String>) {
        if *self.running != running {
            self.running = Arc::new(running);
            self.dirty = true;
        }
    }

    /// Replace local state with an authoritative server push. The
    /// connection state machine stays local; server-reported ids are
    /// adopted only while a session is live in this epoch.
    pub(crate) fn apply_server_state(&mut self, state: ServerState) {
        self.replace_configurations(state.configurations);
        self.replace_sequences(state.sequences);

        match state.active_configuration_id {
            Some(id) => self.set_active_configuration(&id),
            None if self.session.active_configuration_id.is_some() => {
                self.session.active_configuration_id = None;
                self.configuration_revision += 1;
                self.dirty = true;
            }
            None => {}
        }
        if let Some(feedsystem) = state.active_feedsystem {
            self.set_active_feedsystem(&feedsystem);
        }

        if let Some(issued) = state.session {
            if self.session.connection == ConnectionState::Connected {
                let before = self.session.clone();
                adopt_session(&mut self.session, issued);
                if self.session != before {
                    self.dirty = true;
                }
            }
        }
    }
}

fn adopt_session(session: &mut SessionState, issued: ServerSession) {
    session.session_id = Some(issued.session_id);
    session.forwarding_id = Some(issued.forwarding_id);
    session.self_address = issued.self_address;
    session.self_port = issued.self_port;
}
