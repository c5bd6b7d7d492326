// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::Transport;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [link]
/// transport = "unix"
/// address = "/run/jobgate.sock"
///
/// [storage]
/// root = "/var/lib/jobgate"
///
/// [heartbeat]
/// interval = "30s"
///
/// [tables]
/// directory = "/var/lib/jobgate/tables"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub link: LinkSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub heartbeat: HeartbeatSection,

    #[serde(default)]
    pub tables: TablesSection,

    #[serde(default)]
    pub executor: ExecutorSection,
}

/// A validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)`, which also
/// resolves the duration strings.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub link: LinkSection,
    pub storage: StorageSection,
    pub heartbeat: HeartbeatSection,
    pub tables: TablesSection,
    pub executor: ExecutorSection,
    pub timings: Timings,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, timings: Timings) -> Self {
        Self {
            link: raw.link,
            storage: raw.storage,
            heartbeat: raw.heartbeat,
            tables: raw.tables,
            executor: raw.executor,
            timings,
        }
    }
}

/// Durations parsed out of the raw string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub heartbeat_interval: Duration,
    pub dead_connection_timeout: Option<Duration>,
    pub shutdown_drain_timeout: Duration,
}

/// `[link]` section: how the Orchestrator reaches us.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkSection {
    #[serde(default)]
    pub transport: Transport,

    /// `host:port` for TCP, a socket path for Unix.
    #[serde(default = "default_address")]
    pub address: String,

    /// Upper bound on a single frame payload, in bytes.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    /// How long `vm_shutdown` waits for in-flight request workers.
    #[serde(default = "default_drain_timeout")]
    pub shutdown_drain_timeout: String,
}

fn default_address() -> String {
    "127.0.0.1:7600".to_string()
}

fn default_max_frame_len() -> usize {
    64 * 1024 * 1024
}

fn default_drain_timeout() -> String {
    "10s".to_string()
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            address: default_address(),
            max_frame_len: default_max_frame_len(),
            shutdown_drain_timeout: default_drain_timeout(),
        }
    }
}

/// `[storage]` section: the three sibling working directories.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_signals_dir")]
    pub signals_dir: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_jobs_signal_dir")]
    pub jobs_signal_dir: String,
}

fn default_root() -> PathBuf {
    PathBuf::from("jobgate-work")
}

fn default_signals_dir() -> String {
    "signals".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_jobs_signal_dir() -> String {
    "jobs-signals".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            signals_dir: default_signals_dir(),
            data_dir: default_data_dir(),
            jobs_signal_dir: default_jobs_signal_dir(),
        }
    }
}

impl StorageSection {
    pub fn signals_path(&self) -> PathBuf {
        self.root.join(&self.signals_dir)
    }

    pub fn data_path(&self) -> PathBuf {
        self.root.join(&self.data_dir)
    }

    pub fn jobs_signal_path(&self) -> PathBuf {
        self.root.join(&self.jobs_signal_dir)
    }
}

/// `[heartbeat]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatSection {
    /// Quiet interval after which we ping the Orchestrator.
    #[serde(default = "default_heartbeat_interval")]
    pub interval: String,

    /// If set, a session silent for this long is dropped and the engine reset.
    #[serde(default)]
    pub dead_connection_timeout: Option<String>,
}

fn default_heartbeat_interval() -> String {
    "30s".to_string()
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval: default_heartbeat_interval(),
            dead_connection_timeout: None,
        }
    }
}

/// `[tables]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TablesSection {
    /// Directory holding `catalog.toml` and one file per table identifier.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    /// When false, runnable jobs wait for an external completion report.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Key in the safe object payload holding the shell command.
    #[serde(default = "default_command_key")]
    pub command_key: String,
}

fn default_true() -> bool {
    true
}

fn default_command_key() -> String {
    "cmd".to_string()
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            enabled: true,
            command_key: default_command_key(),
        }
    }
}
