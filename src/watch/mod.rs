// src/watch/mod.rs

//! Signal directory watching.
//!
//! A file appearing in the signals directory means "the value with this
//! name is ready". This module turns those filesystem events into calls on
//! a callback; it knows nothing about jobs or pulls. The reserved halt
//! marker stops the event loop.

pub mod event;
pub mod watcher;

pub use event::created_file_names;
pub use watcher::{OnCreated, WatcherHandle, spawn_signal_watcher};
