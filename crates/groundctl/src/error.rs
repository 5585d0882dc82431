//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use groundctl_config::ConfigError;
use groundctl_core::{CoreError, DispatchError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("No server address configured")]
    #[diagnostic(
        code(groundctl::no_server),
        help(
            "Pass --server <host[:port]>, set GROUNDCTL_SERVER, or create a profile:\n\
             groundctl config init --server <host[:port]>\n\
             Config file: {path}"
        )
    )]
    NoServer { path: String },

    #[error("Could not reach the server: {reason}")]
    #[diagnostic(
        code(groundctl::transport),
        help("Check that the servo server is running and reachable. Use -k for self-signed TLS.")
    )]
    Transport { reason: String },

    #[error("Connection attempt was superseded by a newer one")]
    #[diagnostic(code(groundctl::superseded))]
    Superseded,

    // ── Server outcomes ──────────────────────────────────────────────
    #[error("Rejected by server: {reason}")]
    #[diagnostic(code(groundctl::rejected))]
    Rejected { reason: String },

    #[error("No acknowledgement within {timeout_ms}ms")]
    #[diagnostic(
        code(groundctl::timeout),
        help("Raise the limit with --timeout-ms or check server responsiveness.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(groundctl::not_found),
        help("Run: groundctl {list_command} to see what the server holds")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(groundctl::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(groundctl::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: groundctl config init --name {name} --server <addr>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(groundctl::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(groundctl::json), help("Check the file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML payload: {0}")]
    #[diagnostic(code(groundctl::toml), help("Check the file contents and try again."))]
    Toml(#[from] toml::de::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoServer { .. } | Self::Validation { .. } | Self::ProfileNotFound { .. } => {
                exit_code::USAGE
            }
            Self::Transport { .. } | Self::Superseded => exit_code::CONNECTION,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<DispatchError> for CliError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Rejected { reason } => CliError::Rejected { reason },
            DispatchError::Timeout { timeout_ms } => CliError::Timeout { timeout_ms },
            DispatchError::Transport { reason } => CliError::Transport { reason },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::NotConnected => CliError::NoServer {
                path: groundctl_config::config_path().display().to_string(),
            },
            CoreError::ConfigurationNotFound { id } => CliError::NotFound {
                resource_type: "configuration".into(),
                identifier: id,
                list_command: "configs list".into(),
            },
            CoreError::Dispatch(e) => e.into(),
            CoreError::Superseded { .. } => CliError::Superseded,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
