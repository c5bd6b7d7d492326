// src/exec/backend.rs

//! Pluggable execution collaborator.
//!
//! The engine never runs a job itself. The dispatcher hands every
//! [`RunnableJob`] to a `JobExecutor` and turns the returned outcome into a
//! `job_done` / `job_fail` signal.
//!
//! - [`ProcessExecutor`](super::process::ProcessExecutor) spawns the safe
//!   object's command in production.
//! - [`NoopExecutor`] never finishes; runnable jobs wait for an external
//!   `report_job_finished`.
//! - Tests provide their own recording implementation.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::jobs::RunnableJob;
use crate::types::JobOutcome;

/// Boxed future returned by [`JobExecutor::execute`].
pub type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = JobOutcome> + Send + 'a>>;

/// Trait abstracting how a runnable job is carried out.
///
/// Dropping the returned future must abandon the execution; the dispatcher
/// relies on that to cancel in-flight jobs on reset.
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: RunnableJob) -> ExecuteFuture<'_>;
}

/// Executor that accepts jobs and never completes them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

impl JobExecutor for NoopExecutor {
    fn execute(&self, job: RunnableJob) -> ExecuteFuture<'_> {
        Box::pin(async move {
            debug!(job = %job.job_id, "execution disabled; waiting for external completion");
            std::future::pending::<JobOutcome>().await
        })
    }
}
