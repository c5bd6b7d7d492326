#![allow(dead_code)]

use std::path::PathBuf;

use jobgate::config::{ConfigFile, RawConfigFile};
use jobgate::types::Transport;

/// Starts from the built-in defaults; each `with_*` overrides one field of
/// the raw TOML model before validation.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_transport(mut self, transport: Transport, address: &str) -> Self {
        self.config.link.transport = transport;
        self.config.link.address = address.to_string();
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.config.link.max_frame_len = len;
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage.root = root.into();
        self
    }

    pub fn with_heartbeat(mut self, interval: &str) -> Self {
        self.config.heartbeat.interval = interval.to_string();
        self
    }

    pub fn with_dead_connection_timeout(mut self, timeout: &str) -> Self {
        self.config.heartbeat.dead_connection_timeout = Some(timeout.to_string());
        self
    }

    pub fn with_tables_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tables.directory = Some(dir.into());
        self
    }

    pub fn with_executor_enabled(mut self, enabled: bool) -> Self {
        self.config.executor.enabled = enabled;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("builder settings should pass config validation")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
