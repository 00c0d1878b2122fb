//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "flowguard", version, about = "Filament flow guard")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit JSON lines instead of plain text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the configuration, then report what would run
    SelfCheck,
    /// Replay a scripted session against simulated pins and a recording link
    Replay {
        /// JSON-lines script: one `{"at_ms": N, "event": ...}` object per line
        #[arg(long, value_name = "FILE")]
        script: PathBuf,
        /// Override protocol.tick_ms for the replay
        #[arg(long, value_name = "MS")]
        tick_ms: Option<u32>,
        /// Answer every tracked command with a matching acknowledgment
        #[arg(long, action = ArgAction::SetTrue)]
        auto_ack: bool,
    },
}
