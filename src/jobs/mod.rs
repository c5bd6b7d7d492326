// src/jobs/mod.rs

//! Jobs, safe objects, and the registries that hold them.
//!
//! - [`safe_object`]: task templates with single-shot setup and a queue of
//!   jobs waiting for that setup.
//! - [`job`]: per-job parameter bindings and the runnable transition.
//! - [`binding`]: one (possibly array-valued) parameter of a job.
//! - [`registry`]: the independently locked containers the engine owns.

pub mod binding;
pub mod job;
pub mod registry;
pub mod safe_object;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use binding::{BindOutcome, BindingError, ParameterBinding, ValueSlot};
pub use job::{Job, JobStatus, ResolvedParameter, RunnableJob};
pub use registry::{
    JobRegistry, KeyedRegistry, ParameterWaitIndex, PullRequestIndex, SafeObjectRegistry,
};
pub use safe_object::SafeObject;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this crate leaves its data consistent before
/// doing anything that can panic, so the poison flag carries no information.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
