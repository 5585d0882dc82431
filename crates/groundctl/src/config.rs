//! Profile resolution for the CLI.
//!
//! Thin layer over `groundctl-config`: picks the profile, then lets the
//! global flags override what it says.

use std::time::Duration;

use groundctl_config::{Config, ConfigError};
use groundctl_core::{ControllerConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Profile name plus the controller settings built from it.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub controller: ControllerConfig,
}

/// Pick the profile named by `--profile` (or the default) and build a
/// `ControllerConfig` with CLI flag overrides applied.
pub fn resolve(global: &GlobalOpts, cfg: &Config) -> Result<Resolved, CliError> {
    let (profile_name, profile) = cfg
        .profile(global.profile.as_deref())
        .map_err(|e| match e {
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: available_profiles(cfg),
            },
            other => other.into(),
        })?;

    let mut controller = groundctl_config::profile_to_controller_config(&profile, &cfg.defaults)?;
    apply_overrides(&mut controller, global)?;

    Ok(Resolved {
        profile_name,
        controller,
    })
}

fn apply_overrides(controller: &mut ControllerConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref server) = global.server {
        let server = server.trim();
        if server.is_empty() {
            return Err(CliError::Validation {
                field: "server".into(),
                reason: "must not be empty".into(),
            });
        }
        controller.server_address = Some(server.to_owned());
    }

    if let Some(ms) = global.timeout_ms {
        if ms == 0 {
            return Err(CliError::Validation {
                field: "timeout-ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        controller.command_timeout = Duration::from_millis(ms);
    }

    if global.insecure {
        controller.tls = TlsVerification::DangerAcceptInvalid;
    }
    Ok(())
}

/// Comma-separated profile names, sorted, for help text.
pub fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use groundctl_config::Profile;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["groundctl"];
        argv.extend_from_slice(args);
        argv.push("status");
        Cli::parse_from(argv).global
    }

    fn config_with_stand() -> Config {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "stand".into(),
            Profile {
                server: Some("10.0.0.5:7200".into()),
                command_timeout_ms: Some(1_500),
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn flags_override_profile() {
        let cfg = config_with_stand();
        let resolved = resolve(
            &global(&["-p", "stand", "--server", "stand.local", "--timeout-ms", "900", "-k"]),
            &cfg,
        )
        .unwrap();

        assert_eq!(resolved.profile_name, "stand");
        assert_eq!(resolved.controller.server_address.as_deref(), Some("stand.local"));
        assert_eq!(resolved.controller.command_timeout, Duration::from_millis(900));
        assert_eq!(resolved.controller.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn unknown_profile_lists_alternatives() {
        let cfg = config_with_stand();
        let err = resolve(&global(&["-p", "pad"]), &cfg).unwrap_err();
        match err {
            CliError::ProfileNotFound { name, available } => {
                assert_eq!(name, "pad");
                assert_eq!(available, "stand");
            }
            other => panic!("expected ProfileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn blank_server_flag_is_rejected() {
        let err = resolve(&global(&["--server", "  "]), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "server"));
    }
}
