//! Session commands: connect, status, feed-system selection.

use std::fmt::Write as _;

use serde::Serialize;

use groundctl_core::{Controller, ControllerConfig, SessionState};

use crate::cli::{FeedsystemArgs, GlobalOpts};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

// ── connect ──────────────────────────────────────────────────────────

pub async fn connect(config: ControllerConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let session = Controller::oneshot(config, |c| async move { Ok(c.session()) }).await?;

    let out = output::render_single(
        &global.output,
        &masked(&session, global.reveal),
        session_detail,
        |s| s.session_id.clone().unwrap_or_default(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── status ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Status {
    session: SessionState,
    configurations: Vec<String>,
    sequences: Vec<String>,
    running: Vec<String>,
}

pub async fn status(config: ControllerConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let wait = config.command_timeout;
    let snapshot = util::streamed_snapshot(config, wait, |s| {
        s.session.active_configuration_id.is_some() || s.session.active_feedsystem.is_some()
    })
    .await?;

    let status = Status {
        session: masked(&snapshot.session, global.reveal),
        configurations: snapshot.configurations.iter().map(|c| c.id.clone()).collect(),
        sequences: snapshot.sequences.iter().map(|s| s.name.clone()).collect(),
        running: snapshot.running_sequences.iter().cloned().collect(),
    };

    let out = output::render_single(
        &global.output,
        &status,
        |s| {
            let mut text = session_detail(&s.session);
            let _ = writeln!(text);
            let _ = writeln!(text, "Configurations: {}", list_or_dash(&s.configurations));
            let _ = writeln!(text, "Sequences:      {}", list_or_dash(&s.sequences));
            let _ = write!(text, "Running:        {}", list_or_dash(&s.running));
            text
        },
        |s| s.session.connection.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── feedsystem ───────────────────────────────────────────────────────

pub async fn select_feedsystem(
    args: FeedsystemArgs,
    config: ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = args
        .id
        .or_else(|| config.default_feedsystem.clone())
        .ok_or_else(|| CliError::Validation {
            field: "feedsystem".into(),
            reason: "no id given and the profile has no default_feedsystem".into(),
        })?;

    let subject = id.clone();
    let ack = Controller::oneshot(config, |c| async move {
        c.send_active_feedsystem(&id).await
    })
    .await?;
    util::print_ack(&ack, &format!("feed system '{subject}'"), global)
}

// ── Helpers ──────────────────────────────────────────────────────────

fn masked(session: &SessionState, reveal: bool) -> SessionState {
    let mut session = session.clone();
    if !reveal {
        for id in [&mut session.session_id, &mut session.forwarding_id] {
            if let Some(value) = id.as_mut() {
                *value = output::mask_id(Some(value.as_str()), false);
            }
        }
    }
    session
}

fn session_detail(s: &SessionState) -> String {
    let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    let mut lines = vec![
        format!("Server:         {}", dash(&s.server_address)),
        format!("Connection:     {}", s.connection),
        format!("Session:        {}", dash(&s.session_id)),
        format!("Forwarding:     {}", dash(&s.forwarding_id)),
    ];
    if let Some(ref addr) = s.self_address {
        let port = s.self_port.map(|p| format!(":{p}")).unwrap_or_default();
        lines.push(format!("Seen as:        {addr}{port}"));
    }
    lines.push(format!("Configuration:  {}", dash(&s.active_configuration_id)));
    lines.push(format!("Feed system:    {}", dash(&s.active_feedsystem)));
    lines.join("\n")
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".into()
    } else {
        items.join(", ")
    }
}
