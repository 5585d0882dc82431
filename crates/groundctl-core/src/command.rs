// ── Command API ──
//
// Every operator intent can be expressed as a `Command` and executed
// through `Controller::execute`. The controller routes each variant to
// the matching session or dispatch operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, IntoStaticStr};

use crate::model::{Configuration, MappingEntry, SessionState};

/// Remote operations that end in a server acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    RunSequence,
    StopSequence,
    Abort,
    PutConfiguration,
    SetActiveConfiguration,
    SetActiveFeedsystem,
    SubmitSequence,
}

/// A server acknowledgement. The server's response body is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub operation: Operation,
    pub acknowledged_at: DateTime<Utc>,
}

impl Ack {
    pub fn now(operation: Operation) -> Self {
        Self {
            operation,
            acknowledged_at: Utc::now(),
        }
    }
}

/// All operator intents.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Session ──────────────────────────────────────────────────────
    Connect {
        address: String,
    },
    Disconnect,

    // ── Sequences ────────────────────────────────────────────────────
    RunSequence {
        name: String,
        override_checks: bool,
    },
    StopSequence {
        name: String,
    },
    Abort,
    SubmitSequence {
        name: String,
        script: String,
    },

    // ── Configurations ───────────────────────────────────────────────
    PushConfiguration(Configuration),
    FetchConfigurations,
    RefreshConfigurations,
    ActivateConfiguration {
        id: String,
    },
    SelectFeedsystem {
        id: String,
    },
}

/// Result of a successfully executed [`Command`].
#[derive(Debug, Clone)]
pub enum CommandResult {
    Ack(Ack),
    Session(SessionState),
    Configurations(BTreeMap<String, Vec<MappingEntry>>),
    ConfigurationList(Arc<Vec<Configuration>>),
    Disconnected,
}

impl CommandResult {
    pub fn ack(&self) -> Option<&Ack> {
        match self {
            Self::Ack(ack) => Some(ack),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn operations_render_snake_case() {
        assert_eq!(Operation::SetActiveFeedsystem.to_string(), "set_active_feedsystem");
        let name: &'static str = Operation::Abort.into();
        assert_eq!(name, "abort");
    }

    #[test]
    fn ack_serializes_operation_name() {
        let json = serde_json::to_value(Ack::now(Operation::RunSequence)).unwrap();
        assert_eq!(json["operation"], "run_sequence");
    }
}
