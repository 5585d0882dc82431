//! Sequence commands: list, run, stop, abort, submit.

use serde::Serialize;
use tabled::Tabled;

use groundctl_core::{Controller, ControllerConfig, CoreError};

use crate::cli::{GlobalOpts, SequencesArgs, SequencesCommand};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct SequenceInfo {
    name: String,
    running: bool,
    script_bytes: usize,
}

#[derive(Tabled)]
struct SequenceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Running")]
    running: String,
    #[tabled(rename = "Script")]
    script: String,
}

fn sequence_row(s: &SequenceInfo) -> SequenceRow {
    SequenceRow {
        name: s.name.clone(),
        running: if s.running { "yes".into() } else { String::new() },
        script: format!("{} B", s.script_bytes),
    }
}

pub async fn handle(
    args: SequencesArgs,
    config: ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SequencesCommand::List => {
            let wait = config.command_timeout;
            let snapshot = util::streamed_snapshot(config, wait, |s| !s.sequences.is_empty()).await?;
            let sequences: Vec<SequenceInfo> = snapshot
                .sequences
                .iter()
                .map(|s| SequenceInfo {
                    name: s.name.clone(),
                    running: snapshot.is_running(&s.name),
                    script_bytes: s.script.len(),
                })
                .collect();
            let out = output::render_list(&global.output, &sequences, sequence_row, |s| {
                s.name.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SequencesCommand::Run {
            name,
            override_checks,
        } => {
            let subject = format!("sequence '{name}'");
            let ack = Controller::oneshot(config, |c| async move {
                c.run_sequence(&name, override_checks).await
            })
            .await?;
            util::print_ack(&ack, &subject, global)
        }

        SequencesCommand::Stop { name } => {
            let subject = format!("sequence '{name}'");
            let ack =
                Controller::oneshot(config, |c| async move { c.stop_sequence(&name).await }).await?;
            util::print_ack(&ack, &subject, global)
        }

        SequencesCommand::Abort => {
            // No handshake: the server only needs to hear the request.
            let address = config
                .server_address
                .clone()
                .ok_or(CoreError::NotConnected)?;
            let mut config = config;
            config.stream_enabled = false;
            let controller = Controller::from_config(config)?;
            let ack = controller.send_abort_to(&address).await?;
            util::print_ack(&ack, "abort", global)
        }

        SequencesCommand::Submit { name, file } => {
            let script = std::fs::read_to_string(&file)?;
            let subject = format!("sequence '{name}'");
            let ack = Controller::oneshot(config, |c| async move {
                c.send_sequence(&name, &script).await
            })
            .await?;
            util::print_ack(&ack, &subject, global)
        }
    }
}
