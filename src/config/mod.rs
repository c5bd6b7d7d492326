// src/config/mod.rs

//! Configuration loading and validation for jobgate.
//!
//! - `model.rs` defines the TOML-backed data model.
//! - `loader.rs` reads a config file from disk.
//! - `validate.rs` turns a raw file into a checked [`ConfigFile`].

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ConfigFile, ExecutorSection, HeartbeatSection, LinkSection, RawConfigFile, StorageSection,
    TablesSection, Timings,
};
