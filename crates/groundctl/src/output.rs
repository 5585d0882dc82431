//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use groundctl_core::ValveState;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Valve state, colored by how alarming it is.
pub fn valve_state(state: ValveState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        ValveState::Open => text.green().to_string(),
        ValveState::Closed => text.cyan().to_string(),
        ValveState::Undetermined => text.yellow().to_string(),
        ValveState::Disconnected | ValveState::Fault => text.red().bold().to_string(),
    }
}

/// Session and forwarding ids are bearer-like; show only a prefix unless
/// the operator asked for them.
pub fn mask_id(id: Option<&str>, reveal: bool) -> String {
    match id {
        None => "-".into(),
        Some(id) if reveal => id.to_owned(),
        Some(id) => {
            let prefix: String = id.chars().take(4).collect();
            if prefix.len() == id.len() {
                "****".into()
            } else {
                format!("{prefix}****")
            }
        }
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since single-item views are not
/// tabular.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

pub(crate) fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let out = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(out)
}

pub(crate) fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    serde_yaml::to_string(data).map_err(|e| CliError::Validation {
        field: "output".into(),
        reason: format!("cannot render YAML: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_masked_unless_revealed() {
        assert_eq!(mask_id(Some("sess-1234abcd"), false), "sess****");
        assert_eq!(mask_id(Some("abc"), false), "****");
        assert_eq!(mask_id(Some("sess-1234abcd"), true), "sess-1234abcd");
        assert_eq!(mask_id(None, false), "-");
    }

    #[test]
    fn plain_valve_state_has_no_escapes() {
        assert_eq!(valve_state(ValveState::Fault, false), "fault");
        assert!(valve_state(ValveState::Fault, true).contains("\u{1b}["));
    }
}
