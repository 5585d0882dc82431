//! Mapping configuration commands.

use serde::Serialize;
use tabled::Tabled;

use groundctl_core::{Configuration, Controller, ControllerConfig, CoreError, MappingEntry};

use crate::cli::{ConfigsArgs, ConfigsCommand, GlobalOpts};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

// ── Table rows ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Mappings")]
    mappings: usize,
    #[tabled(rename = "Boards")]
    boards: String,
}

fn config_row(c: &Configuration) -> ConfigRow {
    ConfigRow {
        id: c.id.clone(),
        mappings: c.mappings.len(),
        boards: c.boards().join(", "),
    }
}

#[derive(Tabled)]
struct MappingRow {
    #[tabled(rename = "Name")]
    text_id: String,
    #[tabled(rename = "Board")]
    board_id: String,
    #[tabled(rename = "Type")]
    sensor_type: String,
    #[tabled(rename = "Ch")]
    channel: u32,
    #[tabled(rename = "Computer")]
    computer: String,
    #[tabled(rename = "Offset")]
    offset: String,
}

fn mapping_row(m: &MappingEntry) -> MappingRow {
    MappingRow {
        text_id: m.text_id.clone(),
        board_id: m.board_id.clone(),
        sensor_type: m.sensor_type.to_string(),
        channel: m.channel,
        computer: m.computer.to_string(),
        offset: format!("{:.3}", m.calibrated_offset),
    }
}

#[derive(Serialize)]
struct Pushed {
    id: String,
    mappings: usize,
    activated: bool,
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    args: ConfigsArgs,
    config: ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ConfigsCommand::List => {
            let configs = Controller::oneshot(config, |c| async move {
                Ok::<_, CoreError>(c.refresh_configs().await?.to_vec())
            })
            .await?;
            let out = output::render_list(
                &global.output,
                &configs,
                config_row,
                |c| c.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigsCommand::Show { id } => {
            let wanted = id.clone();
            let mut configs = Controller::oneshot(config, |c| async move { c.get_configs().await })
                .await?;
            let mappings = configs
                .remove(&wanted)
                .ok_or(CoreError::ConfigurationNotFound { id })?;
            let out = output::render_list(
                &global.output,
                &mappings,
                mapping_row,
                |m| m.text_id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigsCommand::Push { file, activate } => {
            let configuration = util::read_configuration(&file)?;
            configuration.validate()?;
            let pushed = Pushed {
                id: configuration.id.clone(),
                mappings: configuration.mappings.len(),
                activated: activate,
            };

            Controller::oneshot(config, |c| async move {
                c.send_config(&configuration).await?;
                if activate {
                    c.send_active_config(&configuration.id).await?;
                }
                Ok::<_, CoreError>(())
            })
            .await?;

            let out = output::render_single(
                &global.output,
                &pushed,
                |p| {
                    let suffix = if p.activated { " and activated" } else { "" };
                    format!(
                        "Configuration '{}' stored ({} mappings){suffix}",
                        p.id, p.mappings
                    )
                },
                |p| p.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigsCommand::Activate { id } => {
            let subject = format!("configuration '{id}'");
            let ack = Controller::oneshot(config, |c| async move { c.send_active_config(&id).await })
                .await?;
            util::print_ack(&ack, &subject, global)
        }
    }
}
