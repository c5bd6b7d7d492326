// src/config/validate.rs

use std::collections::HashSet;
use std::path::{Component, Path};

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, Timings};
use crate::errors::{EngineError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::EngineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_link(&raw)?;
        validate_storage(&raw)?;
        let timings = resolve_timings(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, timings))
    }
}

fn validate_link(cfg: &RawConfigFile) -> Result<()> {
    if cfg.link.address.trim().is_empty() {
        return Err(EngineError::ConfigError(
            "[link].address must not be empty".to_string(),
        ));
    }

    if cfg.link.max_frame_len == 0 {
        return Err(EngineError::ConfigError(
            "[link].max_frame_len must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.link.max_frame_len > u32::MAX as usize {
        return Err(EngineError::ConfigError(format!(
            "[link].max_frame_len must fit in a u32 length prefix (got {})",
            cfg.link.max_frame_len
        )));
    }

    Ok(())
}

fn validate_storage(cfg: &RawConfigFile) -> Result<()> {
    let dirs = [
        ("signals_dir", &cfg.storage.signals_dir),
        ("data_dir", &cfg.storage.data_dir),
        ("jobs_signal_dir", &cfg.storage.jobs_signal_dir),
    ];

    let mut seen = HashSet::new();
    for (key, name) in dirs {
        if !is_single_component(name) {
            return Err(EngineError::ConfigError(format!(
                "[storage].{key} must be a single directory name (got {name:?})"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(EngineError::ConfigError(format!(
                "[storage].{key} reuses directory name {name:?}; the three working directories must be distinct"
            )));
        }
    }

    Ok(())
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn resolve_timings(cfg: &RawConfigFile) -> Result<Timings> {
    let heartbeat_interval = parse_duration(&cfg.heartbeat.interval)
        .map_err(|e| EngineError::ConfigError(format!("[heartbeat].interval: {e}")))?;

    if heartbeat_interval.is_zero() {
        return Err(EngineError::ConfigError(
            "[heartbeat].interval must be greater than zero".to_string(),
        ));
    }

    let dead_connection_timeout = match cfg.heartbeat.dead_connection_timeout.as_deref() {
        Some(raw) => {
            let timeout = parse_duration(raw).map_err(|e| {
                EngineError::ConfigError(format!("[heartbeat].dead_connection_timeout: {e}"))
            })?;
            if timeout <= heartbeat_interval {
                return Err(EngineError::ConfigError(format!(
                    "[heartbeat].dead_connection_timeout ({raw}) must be longer than the interval ({})",
                    cfg.heartbeat.interval
                )));
            }
            Some(timeout)
        }
        None => None,
    };

    let shutdown_drain_timeout = parse_duration(&cfg.link.shutdown_drain_timeout)
        .map_err(|e| EngineError::ConfigError(format!("[link].shutdown_drain_timeout: {e}")))?;

    Ok(Timings {
        heartbeat_interval,
        dead_connection_timeout,
        shutdown_drain_timeout,
    })
}
