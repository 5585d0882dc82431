//! Shared configuration for groundctl.
//!
//! TOML profiles merged with `GROUNDCTL_`-prefixed environment variables,
//! and translation to `groundctl_core::ControllerConfig`. The core never
//! reads files; the CLI layers its flag overrides on top of what this
//! crate produces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use groundctl_core::{ControllerConfig, StreamReconnect, TlsVerification};

/// Prefix for environment overrides, e.g.
/// `GROUNDCTL_PROFILES__STAND__SERVER=10.0.0.5`.
pub const ENV_PREFIX: &str = "GROUNDCTL_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    ///
    /// A missing *default* profile yields an empty one so a bare
    /// `--server` flag still works without any config file.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, Profile), ConfigError> {
        match name {
            Some(name) => self
                .profiles
                .get(name)
                .cloned()
                .map(|p| (name.to_owned(), p))
                .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() }),
            None => {
                let name = self
                    .default_profile
                    .clone()
                    .unwrap_or_else(|| "default".into());
                let profile = self.profiles.get(&name).cloned().unwrap_or_default();
                Ok((name, profile))
            }
        }
    }
}

/// Settings that apply across profiles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// Output format: table, json, yaml or plain.
    #[serde(default = "default_output")]
    pub output: String,

    /// Color mode: auto, always or never.
    #[serde(default = "default_color")]
    pub color: String,

    /// Command timeout in milliseconds, unless a profile overrides it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout_ms() -> u64 {
    5_000
}

/// A named server profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Servo server address (`host`, `host:port` or a full URL).
    pub server: Option<String>,

    /// Override the default command timeout.
    pub command_timeout_ms: Option<u64>,

    /// Heartbeat latency above which the session counts as lost.
    pub disconnect_threshold_ms: Option<u64>,

    /// Feed system normally selected for this stand.
    pub default_feedsystem: Option<String>,

    /// Attach to the data stream after connecting.
    pub stream: Option<bool>,

    /// Path to a custom CA certificate for `https` servers.
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification (self-signed servers).
    #[serde(default)]
    pub insecure: bool,

    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

/// Data-stream backoff, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectSettings {
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "groundctl", "groundctl").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("groundctl");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to ControllerConfig ─────────────────────────────────

/// Build a `ControllerConfig` from a profile, with `defaults` filling
/// anything the profile leaves unset.
pub fn profile_to_controller_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    let base = ControllerConfig::default();

    let server_address = match profile.server.as_deref().map(str::trim) {
        Some("") => return Err(invalid("server", "must not be empty")),
        Some(server) => Some(server.to_owned()),
        None => None,
    };

    let timeout_ms = profile.command_timeout_ms.unwrap_or(defaults.timeout_ms);
    if timeout_ms == 0 {
        return Err(invalid("command_timeout_ms", "must be greater than zero"));
    }

    let disconnect_threshold_ms = profile
        .disconnect_threshold_ms
        .unwrap_or(base.disconnect_threshold_ms);
    if disconnect_threshold_ms == 0 {
        return Err(invalid("disconnect_threshold_ms", "must be greater than zero"));
    }

    let reconnect = reconnect_from(&profile.reconnect, &base.reconnect)?;

    let tls = if profile.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(ControllerConfig {
        server_address,
        command_timeout: Duration::from_millis(timeout_ms),
        disconnect_threshold_ms,
        default_feedsystem: profile.default_feedsystem.clone(),
        stream_enabled: profile.stream.unwrap_or(base.stream_enabled),
        reconnect,
        tls,
    })
}

fn reconnect_from(
    settings: &ReconnectSettings,
    base: &StreamReconnect,
) -> Result<StreamReconnect, ConfigError> {
    let initial_delay = settings
        .initial_delay_ms
        .map_or(base.initial_delay, Duration::from_millis);
    let max_delay = settings
        .max_delay_ms
        .map_or(base.max_delay, Duration::from_millis);
    if max_delay < initial_delay {
        return Err(invalid(
            "reconnect.max_delay_ms",
            "must not be below reconnect.initial_delay_ms",
        ));
    }
    Ok(StreamReconnect {
        initial_delay,
        max_delay,
        max_retries: settings.max_retries.or(base.max_retries),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_profile = "stand"

[defaults]
output = "json"
timeout_ms = 3000

[profiles.stand]
server = "10.0.0.5"
disconnect_threshold_ms = 2500
default_feedsystem = "Feedsystem_1"

[profiles.stand.reconnect]
initial_delay_ms = 250
max_retries = 4

[profiles.bench]
server = "https://bench.local:7443"
insecure = true
stream = false
"#;

    fn write_sample() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_profiles_from_file() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("stand"));
        assert_eq!(config.defaults.output, "json");
        assert_eq!(config.defaults.color, "auto");
        assert_eq!(config.profiles.len(), 2);
        assert!(config.profiles["bench"].insecure);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.defaults, Defaults::default());
    }

    #[test]
    fn default_profile_translates_with_defaults_filled_in() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();
        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "stand");

        let controller = profile_to_controller_config(&profile, &config.defaults).unwrap();
        assert_eq!(controller.server_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(controller.command_timeout, Duration::from_secs(3));
        assert_eq!(controller.disconnect_threshold_ms, 2_500);
        assert_eq!(controller.default_feedsystem.as_deref(), Some("Feedsystem_1"));
        assert_eq!(controller.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(controller.reconnect.max_retries, Some(4));
        assert!(controller.stream_enabled);
        assert_eq!(controller.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn insecure_profile_skips_verification() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();
        let (_, profile) = config.profile(Some("bench")).unwrap();

        let controller = profile_to_controller_config(&profile, &config.defaults).unwrap();
        assert_eq!(controller.tls, TlsVerification::DangerAcceptInvalid);
        assert!(!controller.stream_enabled);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let config = Config::default();
        assert!(matches!(
            config.profile(Some("nope")),
            Err(ConfigError::UnknownProfile { .. })
        ));
        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "default");
        assert_eq!(profile, Profile::default());
    }

    #[test]
    fn rejects_inverted_backoff_and_zero_timeout() {
        let defaults = Defaults::default();
        let profile = Profile {
            reconnect: ReconnectSettings {
                initial_delay_ms: Some(5_000),
                max_delay_ms: Some(100),
                max_retries: None,
            },
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_controller_config(&profile, &defaults),
            Err(ConfigError::Validation { .. })
        ));

        let profile = Profile {
            command_timeout_ms: Some(0),
            ..Profile::default()
        };
        assert!(profile_to_controller_config(&profile, &defaults).is_err());
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                server: Some("10.0.0.9".into()),
                ..Profile::default()
            },
        );

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles, config.profiles);
    }
}
