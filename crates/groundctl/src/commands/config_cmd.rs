//! Config subcommand handlers. None of these touch the network.

use std::fmt::Write as _;

use groundctl_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Format the config as TOML-ish text, profiles in name order.
fn format_config(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = write!(out, "timeout_ms = {}", cfg.defaults.timeout_ms);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let Some(p) = cfg.profiles.get(name) else {
            continue;
        };
        let _ = writeln!(out);
        let _ = writeln!(out);
        let _ = write!(out, "[profiles.{name}]");
        if let Some(ref server) = p.server {
            let _ = write!(out, "\nserver = \"{server}\"");
        }
        if let Some(ms) = p.command_timeout_ms {
            let _ = write!(out, "\ncommand_timeout_ms = {ms}");
        }
        if let Some(ms) = p.disconnect_threshold_ms {
            let _ = write!(out, "\ndisconnect_threshold_ms = {ms}");
        }
        if let Some(ref fs) = p.default_feedsystem {
            let _ = write!(out, "\ndefault_feedsystem = \"{fs}\"");
        }
        if let Some(stream) = p.stream {
            let _ = write!(out, "\nstream = {stream}");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = write!(out, "\nca_cert = \"{}\"", ca.display());
        }
        if p.insecure {
            let _ = write!(out, "\ninsecure = true");
        }
    }

    out
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&groundctl_config::config_path().display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = groundctl_config::load_config()?;
            let out = output::render_single(&global.output, &cfg, format_config, |c| {
                c.default_profile.clone().unwrap_or_default()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init {
            name,
            server,
            feedsystem,
        } => {
            let server = server.trim();
            if server.is_empty() {
                return Err(CliError::Validation {
                    field: "server".into(),
                    reason: "must not be empty".into(),
                });
            }

            let mut cfg = groundctl_config::load_config_or_default();
            let profile = cfg.profiles.entry(name.clone()).or_insert_with(Profile::default);
            profile.server = Some(server.to_owned());
            if feedsystem.is_some() {
                profile.default_feedsystem = feedsystem;
            }
            if cfg.profiles.len() == 1 {
                cfg.default_profile = Some(name.clone());
            }

            // Refuse to write a profile the controller could not use.
            if let Some(profile) = cfg.profiles.get(&name) {
                groundctl_config::profile_to_controller_config(profile, &cfg.defaults)?;
            }

            let path = groundctl_config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Profile '{name}' saved to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = groundctl_config::load_config()?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            let mut names: Vec<&String> = cfg.profiles.keys().collect();
            names.sort();
            let out = names
                .iter()
                .map(|n| {
                    if n.as_str() == default {
                        format!("{n} (default)")
                    } else {
                        (*n).clone()
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
