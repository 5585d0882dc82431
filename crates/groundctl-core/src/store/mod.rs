// ── Canonical state store ──
//
// Single owner of session, configuration and sequence state. Every
// mutation goes through `StateStore::update` and is published on the
// state bus before the lock is released.

mod data_store;
mod refresh;
mod telemetry_cache;

pub use data_store::StateStore;
pub(crate) use data_store::CanonicalState;
pub use telemetry_cache::TelemetryCache;
