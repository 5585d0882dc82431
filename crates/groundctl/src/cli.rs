//! Clap derive structures for the `groundctl` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use groundctl_core::SurfaceKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// groundctl -- operator console for a servo test-stand server
#[derive(Debug, Parser)]
#[command(
    name = "groundctl",
    version,
    about = "Drive a servo test-stand session from the command line",
    long_about = "Connects to a servo server, manages mapping configurations and \
        feed systems,\nruns and aborts sequences, and watches live device telemetry.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "GROUNDCTL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server address, `host[:port]` or URL (overrides profile)
    #[arg(long, short = 's', env = "GROUNDCTL_SERVER", global = true)]
    pub server: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "GROUNDCTL_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "GROUNDCTL_INSECURE", global = true)]
    pub insecure: bool,

    /// Command timeout in milliseconds (overrides profile)
    #[arg(long, env = "GROUNDCTL_TIMEOUT_MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// Show session and forwarding ids in full
    #[arg(long, global = true)]
    pub reveal: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the server and show the session it issues
    Connect,

    /// Show the server's active configuration and feed system
    Status,

    /// Manage mapping configurations
    #[command(alias = "cfg")]
    Configs(ConfigsArgs),

    /// Select the active feed system
    Feedsystem(FeedsystemArgs),

    /// Run, stop, abort and store sequences
    #[command(alias = "seq")]
    Sequences(SequencesArgs),

    /// Trigger the abort sequence (same as `sequences abort`)
    Abort,

    /// Watch live device telemetry for one surface
    Watch(WatchArgs),

    /// Manage the groundctl configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Configurations ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigsArgs {
    #[command(subcommand)]
    pub command: ConfigsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigsCommand {
    /// List configurations stored on the server
    #[command(alias = "ls")]
    List,

    /// Show the mappings of one configuration
    Show {
        /// Configuration id
        id: String,
    },

    /// Create or replace a configuration from a JSON or TOML file
    Push {
        /// File holding `{ id, mappings = [...] }`
        file: PathBuf,

        /// Make the configuration active once stored
        #[arg(long)]
        activate: bool,
    },

    /// Make a stored configuration the active one
    Activate {
        /// Configuration id
        id: String,
    },
}

// ── Feed system ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct FeedsystemArgs {
    /// Feed system id (defaults to the profile's `default_feedsystem`)
    pub id: Option<String>,
}

// ── Sequences ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SequencesArgs {
    #[command(subcommand)]
    pub command: SequencesCommand,
}

#[derive(Debug, Subcommand)]
pub enum SequencesCommand {
    /// List sequences known to the server (requires the data stream)
    #[command(alias = "ls")]
    List,

    /// Start a sequence
    Run {
        name: String,

        /// Bypass the server's pre-run checks
        #[arg(long = "override")]
        override_checks: bool,
    },

    /// Stop a running sequence
    Stop { name: String },

    /// Trigger the abort sequence
    Abort,

    /// Store a sequence script on the server
    Submit {
        name: String,

        /// Script file
        file: PathBuf,
    },
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Surface kind to resolve devices for
    #[arg(long, default_value = "sam")]
    pub surface: SurfaceKind,

    /// Board id (SAM) or label for the surface
    #[arg(long, short = 'b', default_value = "")]
    pub board: String,

    /// Stop after this many updates
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ── Config file ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the effective configuration
    Show,

    /// Create or update a profile
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Server address for the profile
        #[arg(long)]
        server: String,

        /// Default feed system
        #[arg(long)]
        feedsystem: Option<String>,
    },

    /// List profile names
    Profiles,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
