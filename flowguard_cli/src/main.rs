mod cli;
mod error_fmt;
mod replay;
mod self_check;

use std::io::Write;
use std::path::Path;

use clap::Parser;
use eyre::Result;
use flowguard_config::{Config, Logging};
use flowguard_core::config::GuardConfig;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{CliError, exit_code_for_error, format_error_json, humanize};
use crate::replay::{ReplayOptions, parse_script, run_replay};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    if let Err(err) = run(&cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::error!(error = %err, "command failed");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(cli, &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "configuration loaded");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match &cli.cmd {
        Commands::SelfCheck => self_check::self_check(&cfg, cli.json, &mut out)?,
        Commands::Replay {
            script,
            tick_ms,
            auto_ack,
        } => {
            let text = std::fs::read_to_string(script).map_err(|e| CliError::ScriptRead {
                path: script.display().to_string(),
                msg: e.to_string(),
            })?;
            let events = parse_script(&text)?;
            let opts = ReplayOptions {
                tick_ms: *tick_ms,
                auto_ack: *auto_ack,
                json: cli.json,
            };
            run_replay(GuardConfig::from(&cfg), &events, opts, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config, CliError> {
    let loaded = match path {
        Some(p) => flowguard_config::load_file(p),
        None => {
            let cfg = Config::default();
            cfg.validate().map(|()| cfg)
        }
    };
    loaded.map_err(|e| CliError::Config(format!("{e:#}")))
}

fn rotation(name: Option<&str>) -> tracing_appender::rolling::Rotation {
    use tracing_appender::rolling::Rotation;
    match name {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    }
}

/// Console logs go to stderr so stdout carries only command output; the
/// optional `[logging] file` gets JSON lines with its own level.
fn init_tracing(cli: &Cli, logging: &Logging) -> Result<()> {
    use tracing_appender::rolling::RollingFileAppender;
    use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let prefix = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    CliError::Config(format!("logging.file {} has no file name", path.display()))
                })?;
            let appender = RollingFileAppender::builder()
                .rotation(rotation(logging.rotation.as_deref()))
                .filename_prefix(prefix)
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = logging.level.as_deref().unwrap_or("info");
            let file_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}
