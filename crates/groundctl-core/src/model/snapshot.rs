use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::mapping::Configuration;
use super::sequence::Sequence;
use super::session::SessionState;

/// One consistent view of the canonical state, as handed to surfaces.
///
/// Collections sit behind `Arc` so cloning a snapshot is cheap and
/// unchanged collections are shared between successive versions.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Strictly increasing per publish.
    pub version: u64,
    /// Bumped only when the configuration list or the active id changes;
    /// surfaces rebuild their device records when it moves.
    pub configuration_revision: u64,
    pub published_at: DateTime<Utc>,
    pub session: SessionState,
    pub configurations: Arc<Vec<Configuration>>,
    pub sequences: Arc<Vec<Sequence>>,
    pub running_sequences: Arc<BTreeSet<String>>,
}

impl StateSnapshot {
    /// The configuration named by the session's active id, if the list
    /// holds it.
    pub fn active_configuration(&self) -> Option<&Configuration> {
        let id = self.session.active_configuration_id.as_deref()?;
        self.configuration(id)
    }

    pub fn configuration(&self, id: &str) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.id == id)
    }

    pub fn is_running(&self, sequence: &str) -> bool {
        self.running_sequences.contains(sequence)
    }
}
