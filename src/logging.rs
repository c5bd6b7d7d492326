// src/logging.rs

//! `tracing` subscriber for the `jobgate` binary.
//!
//! `--log-level` wins over `JOBGATE_LOG`, which wins over plain `info`.
//! The environment variable takes either a bare level or a full filter
//! directive such as `jobgate=debug,audit=info`. Output goes to stderr.

use anyhow::{Result, anyhow};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Environment variable consulted when no CLI level is given.
pub const LOG_ENV: &str = "JOBGATE_LOG";

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::default().add_directive(LevelFilter::from(level).into()),
        None => env_filter().unwrap_or_else(|| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("installing log subscriber: {err}"))
}

fn env_filter() -> Option<EnvFilter> {
    let raw = std::env::var(LOG_ENV).ok()?;
    let directives = match raw.trim() {
        "" => return None,
        s if s.eq_ignore_ascii_case("warning") => "warn".to_string(),
        s => s.to_ascii_lowercase(),
    };
    EnvFilter::try_new(directives).ok()
}
