//! Command handlers, one module per top-level subcommand.

pub mod config_cmd;
pub mod configs;
pub mod sequences;
pub mod session;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts, SequencesArgs, SequencesCommand};
use crate::config::Resolved;
use crate::error::CliError;

/// Route a server-facing command to its handler.
pub async fn dispatch(cmd: Command, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    let config = resolved.controller;
    match cmd {
        Command::Connect => session::connect(config, global).await,
        Command::Status => session::status(config, global).await,
        Command::Configs(args) => configs::handle(args, config, global).await,
        Command::Feedsystem(args) => session::select_feedsystem(args, config, global).await,
        Command::Sequences(args) => sequences::handle(args, config, global).await,
        Command::Abort => {
            let args = SequencesArgs {
                command: SequencesCommand::Abort,
            };
            sequences::handle(args, config, global).await
        }
        Command::Watch(args) => watch::handle(args, config, global).await,
        Command::Config(_) | Command::Completions(_) => unreachable!("handled before dispatch"),
    }
}
