// src/exec/mod.rs

//! Execution layer.
//!
//! Decides nothing about *when* a job runs; it only carries out jobs the
//! engine has already found runnable and reports how they ended.
//!
//! - [`backend`] provides the `JobExecutor` trait and `NoopExecutor`.
//! - [`dispatcher`] owns the background loop, the `JobLauncher` handle and
//!   cancellation on reset.
//! - [`process`] runs the safe object's command with `tokio::process`.

pub mod backend;
pub mod dispatcher;
pub mod process;

pub use backend::{ExecuteFuture, JobExecutor, NoopExecutor};
pub use dispatcher::{DispatchCommand, JobLauncher, JobReport, spawn_dispatcher};
pub use process::{ProcessExecutor, param_env_name};
