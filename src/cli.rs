// src/cli.rs

use clap::{Args, Parser, ValueEnum};

use crate::config::LinkSection;
use crate::types::Transport;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobgate",
    version,
    about = "Admit jobs and broker their inputs and outputs for a remote orchestrator."
)]
pub struct CliArgs {
    /// TOML config file. A missing `Jobgate.toml` means built-in defaults.
    #[arg(long, value_name = "PATH", default_value = "Jobgate.toml")]
    pub config: String,

    #[command(flatten)]
    pub link: LinkOverrides,

    /// Defaults to `JOBGATE_LOG`, then `info`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the configuration, print the effective settings and exit.
    #[arg(long)]
    pub check: bool,
}

/// Flags that take precedence over the `[link]` section.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Orchestrator link")]
pub struct LinkOverrides {
    /// `host:port` for tcp, a socket path for unix.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    #[arg(long, value_name = "tcp|unix")]
    pub transport: Option<Transport>,
}

impl LinkOverrides {
    pub fn apply(&self, link: &mut LinkSection) {
        if let Some(address) = &self.listen {
            link.address.clone_from(address);
        }
        if let Some(transport) = self.transport {
            link.transport = transport;
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
