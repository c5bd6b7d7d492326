// src/fs/work_area.rs

//! The three working directories and the marker-file primitives built on them.
//!
//! A file appearing in the signals directory is the only "value ready"
//! notification in the system. Everything that produces a value goes through
//! [`WorkArea::write_value`], which writes the data file first and only then
//! creates the marker, so a marker is never visible before its data.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::StorageSection;
use crate::errors::EngineError;
use crate::fs::FileSystem;

/// Reserved marker name whose creation tells the signal watcher to stop.
pub const HALT_MARKER: &str = ".jobgate-halt";

/// Reject identifiers that cannot be used as a plain file name inside one of
/// the working directories.
pub fn validate_value_name(name: &str) -> std::result::Result<(), EngineError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name == HALT_MARKER
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(EngineError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct WorkArea {
    fs: Arc<dyn FileSystem>,
    signals: PathBuf,
    data: PathBuf,
    jobs_signals: PathBuf,
}

impl WorkArea {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        signals: impl Into<PathBuf>,
        data: impl Into<PathBuf>,
        jobs_signals: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs,
            signals: signals.into(),
            data: data.into(),
            jobs_signals: jobs_signals.into(),
        }
    }

    pub fn from_config(fs: Arc<dyn FileSystem>, storage: &StorageSection) -> Self {
        Self::new(
            fs,
            storage.signals_path(),
            storage.data_path(),
            storage.jobs_signal_path(),
        )
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn signals_dir(&self) -> &Path {
        &self.signals
    }

    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    pub fn jobs_signal_dir(&self) -> &Path {
        &self.jobs_signals
    }

    pub fn marker_path(&self, value: &str) -> PathBuf {
        self.signals.join(value)
    }

    pub fn data_path(&self, value: &str) -> PathBuf {
        self.data.join(value)
    }

    pub fn has_marker(&self, value: &str) -> bool {
        self.fs.exists(&self.marker_path(value))
    }

    pub fn create_marker(&self, value: &str) -> Result<()> {
        self.fs
            .write(&self.marker_path(value), &[])
            .with_context(|| format!("creating marker for {value:?}"))
    }

    pub fn remove_marker(&self, value: &str) -> Result<()> {
        self.fs
            .remove_file(&self.marker_path(value))
            .with_context(|| format!("removing marker for {value:?}"))
    }

    /// Store `bytes` as the data of `value`, then publish its marker.
    pub fn write_value(&self, value: &str, bytes: &[u8]) -> Result<()> {
        self.fs
            .write(&self.data_path(value), bytes)
            .with_context(|| format!("writing data for {value:?}"))?;
        self.create_marker(value)?;
        debug!(value = %value, len = bytes.len(), "value written and marker published");
        Ok(())
    }

    pub fn read_value(&self, value: &str) -> Result<Vec<u8>> {
        self.fs
            .read(&self.data_path(value))
            .with_context(|| format!("reading data for {value:?}"))
    }

    /// Create the halt marker so a running watcher observes the reset.
    pub fn signal_halt(&self) -> Result<()> {
        self.fs
            .write(&self.signals.join(HALT_MARKER), &[])
            .context("creating halt marker")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in self.dirs() {
            self.fs.create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Delete and recreate all three directories.
    ///
    /// Stops at the first failure and reports the directory involved.
    pub fn recreate(&self) -> std::result::Result<(), EngineError> {
        for dir in self.dirs() {
            self.fs
                .remove_dir_all(dir)
                .and_then(|()| self.fs.create_dir_all(dir))
                .map_err(|source| EngineError::ResetFailed {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }

    fn dirs(&self) -> [&Path; 3] {
        [&self.signals, &self.data, &self.jobs_signals]
    }
}
