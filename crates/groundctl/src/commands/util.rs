//! Shared helpers for command handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use groundctl_core::{
    Ack, Configuration, Controller, ControllerConfig, CoreError, StateSnapshot, Surface,
    SurfaceKind,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

/// Connect with the data stream attached and wait until `ready` holds for
/// a published snapshot, or `wait` elapses. Returns whatever the
/// controller knows at that point.
pub async fn streamed_snapshot(
    config: ControllerConfig,
    wait: Duration,
    ready: impl Fn(&StateSnapshot) -> bool,
) -> Result<Arc<StateSnapshot>, CliError> {
    let mut config = config;
    config.stream_enabled = true;
    let address = config
        .server_address
        .clone()
        .ok_or(CoreError::NotConnected)?;

    let controller = Controller::from_config(config)?;
    let mut sub = controller.subscribe(Surface::new(SurfaceKind::System, "cli"));
    controller.connect(&address).await?;

    let settled = time::timeout(wait, async {
        let mut current = controller.snapshot();
        while !ready(&current) {
            match sub.changed().await {
                Some(next) => current = next,
                None => break,
            }
        }
    })
    .await;
    if settled.is_err() {
        tracing::debug!(wait_ms = wait.as_millis(), "no state frame before deadline");
    }

    let snapshot = controller.snapshot();
    controller.shutdown().await;
    Ok(snapshot)
}

/// Read a configuration from a JSON or TOML file, chosen by extension.
pub fn read_configuration(path: &Path) -> Result<Configuration, CliError> {
    let contents = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let configuration = if is_toml {
        toml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };
    Ok(configuration)
}

/// Print a one-line acknowledgement, or the ack itself for structured
/// output formats.
pub fn print_ack(ack: &Ack, subject: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(
        &global.output,
        ack,
        |a| {
            format!(
                "{} {subject} acknowledged at {}",
                a.operation,
                a.acknowledged_at.format("%H:%M:%S%.3f")
            )
        },
        |a| a.operation.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
