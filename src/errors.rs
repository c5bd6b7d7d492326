// src/errors.rs

//! Crate-wide error type and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::jobs::binding::BindingError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Codec error: {0}")]
    CodecError(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("Value not found: {0}")]
    ValueNotFound(String),

    #[error("Table error for '{table}': {reason}")]
    Table { table: String, reason: String },

    #[error("job '{job}': {source}")]
    Binding {
        job: String,
        #[source]
        source: BindingError,
    },

    #[error("Reset failed on {path:?}: {source}")]
    ResetFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Orchestrator link is not connected")]
    NotConnected,

    #[error("Watcher error: {0}")]
    WatchError(#[from] notify::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used when logging failures.
///
/// Protocol and dependency errors drop the offending request only; filesystem
/// errors during a reset are fatal to that reset; everything else is treated
/// as an internal failure of the worker that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Protocol,
    Dependency,
    Filesystem,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Protocol(_)
            | EngineError::InvalidIdentifier(_)
            | EngineError::Binding { .. }
            | EngineError::CodecError(_)
            | EngineError::NotConnected => ErrorKind::Protocol,
            EngineError::ValueNotFound(_) | EngineError::Table { .. } => ErrorKind::Dependency,
            EngineError::IoError(_) | EngineError::ResetFailed { .. } => ErrorKind::Filesystem,
            EngineError::ConfigError(_)
            | EngineError::TomlError(_)
            | EngineError::WatchError(_)
            | EngineError::Other(_) => ErrorKind::Internal,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EngineError>;
