//! Top-level CLI definition and dispatch.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use bambu_monitor::core::config::Config;
use bambu_monitor::core::errors::MonitorError;
use bambu_monitor::daemon::loop_main::MonitorLoop;
use bambu_monitor::daemon::signals::SignalHandler;
use bambu_monitor::device::DriverRegistry;
use bambu_monitor::logger::activity::{LoggerConfig, spawn_logger};
use bambu_monitor::logger::jsonl::LogLevel;

/// Bambu Monitor: print status notifications and a health endpoint.
#[derive(Debug, Parser)]
#[command(
    name = "bambu-monitor",
    author,
    version,
    about = "Bambu Lab printer monitor - status notifications and health endpoint",
    long_about = None
)]
pub struct Cli {
    /// Config file path (TOML). Environment variables override its values.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Minimum log level: debug, info, warning, error.
    #[arg(long, value_name = "LEVEL", value_parser = parse_log_level)]
    log_level: Option<LogLevel>,
    /// Print the effective configuration with credentials masked, then exit.
    #[arg(long)]
    print_config: bool,
    /// Emit `--print-config` output as JSON instead of TOML.
    #[arg(long, requires = "print_config")]
    json: bool,
}

fn parse_log_level(raw: &str) -> Result<LogLevel, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warning" | "warn" => Ok(LogLevel::Warning),
        "error" => Ok(LogLevel::Error),
        other => Err(format!(
            "unknown log level {other:?} (expected debug, info, warning or error)"
        )),
    }
}

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration missing, unparsable, or invalid.
    #[error("{0}")]
    Config(String),
    /// Printer never connected within the retry budget.
    #[error("{0}")]
    Connection(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Config rendering failed.
    #[error("failed to serialize output: {0}")]
    Serialize(String),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Connection(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Serialize(_) => 3,
        }
    }
}

impl From<MonitorError> for CliError {
    fn from(err: MonitorError) -> Self {
        if err.is_startup_config() {
            Self::Config(err.to_string())
        } else if matches!(err, MonitorError::Connection { .. }) {
            Self::Connection(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

/// Load config, then either print it or run the monitor until shutdown.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    if cli.print_config {
        let rendered = render_config(&config, cli.json)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{rendered}")?;
        return Ok(());
    }

    run_monitor(config)
}

fn run_monitor(config: Config) -> Result<(), CliError> {
    let (logger, logger_join) = spawn_logger(LoggerConfig::stdout(config.logging.level))?;
    let signals = SignalHandler::new();

    let mut monitor = MonitorLoop::new(config, logger.clone(), signals);
    let result = monitor.run(&DriverRegistry);
    if let Err(e) = &result {
        logger.error(format!("Fatal error: {e}"));
    }

    logger.shutdown();
    if logger_join.join().is_err() {
        eprintln!("[BMN-LOGGER] logger thread panicked during shutdown");
    }

    result.map_err(CliError::from)
}

fn render_config(config: &Config, json: bool) -> Result<String, CliError> {
    let redacted = config.redacted();
    if json {
        serde_json::to_string_pretty(&redacted).map_err(|e| CliError::Serialize(e.to_string()))
    } else {
        toml::to_string_pretty(&redacted).map_err(|e| CliError::Serialize(e.to_string()))
    }
}
