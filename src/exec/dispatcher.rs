// src/exec/dispatcher.rs

//! Background loop that owns every in-flight execution.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::exec::backend::JobExecutor;
use crate::jobs::RunnableJob;
use crate::types::{JobId, JobOutcome};

/// Commands accepted by the dispatcher loop.
#[derive(Debug)]
pub enum DispatchCommand {
    Launch(RunnableJob),
    /// Forget the execution of one job incarnation; if it is still running
    /// it is abandoned without a report.
    Release { job_id: JobId, epoch: u64 },
    /// Abandon every in-flight execution without reporting it.
    CancelAll,
}

/// Completion of one execution, sent back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: JobId,
    pub epoch: u64,
    pub outcome: JobOutcome,
}

/// Cheap, cloneable handle jobs use to hand themselves to the dispatcher.
///
/// Sending never blocks, so it is safe to call while holding a job's lock.
#[derive(Debug, Clone)]
pub struct JobLauncher {
    tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl JobLauncher {
    pub fn new(tx: mpsc::UnboundedSender<DispatchCommand>) -> Self {
        Self { tx }
    }

    /// A launcher together with the receiving end of its command channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DispatchCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn launch(&self, job: RunnableJob) {
        let job_id = job.job_id.clone();
        if self.tx.send(DispatchCommand::Launch(job)).is_err() {
            warn!(job = %job_id, "dispatcher is gone; runnable job dropped");
        }
    }

    /// Free the job id once the job has reached a terminal state.
    pub fn release(&self, job_id: &str, epoch: u64) {
        let command = DispatchCommand::Release {
            job_id: job_id.to_string(),
            epoch,
        };
        if self.tx.send(command).is_err() {
            debug!(job = %job_id, "dispatcher is gone; nothing to release");
        }
    }

    pub fn cancel_all(&self) {
        if self.tx.send(DispatchCommand::CancelAll).is_err() {
            debug!("dispatcher is gone; nothing to cancel");
        }
    }
}

/// Handle for a currently-running execution.
struct ActiveJob {
    epoch: u64,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// Spawn the dispatcher loop.
///
/// Each launched job runs in its own Tokio task, and per job id there is
/// never more than one execution in flight: a second launch of a running id
/// is ignored. The loop ends when every [`JobLauncher`] has been dropped.
pub fn spawn_dispatcher(
    executor: Arc<dyn JobExecutor>,
    mut rx: mpsc::UnboundedReceiver<DispatchCommand>,
    reports: mpsc::UnboundedSender<JobReport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("dispatcher loop started");

        let mut active: HashMap<JobId, ActiveJob> = HashMap::new();

        while let Some(command) = rx.recv().await {
            active.retain(|_, job| !job.handle.is_finished());

            match command {
                DispatchCommand::Launch(job) => {
                    launch(job, &mut active, &executor, &reports);
                }
                DispatchCommand::Release { job_id, epoch } => {
                    release(&job_id, epoch, &mut active);
                }
                DispatchCommand::CancelAll => cancel_all(&mut active),
            }
        }

        cancel_all(&mut active);
        info!("dispatcher loop finished (channel closed)");
    })
}

fn launch(
    job: RunnableJob,
    active: &mut HashMap<JobId, ActiveJob>,
    executor: &Arc<dyn JobExecutor>,
    reports: &mpsc::UnboundedSender<JobReport>,
) {
    if let Some(existing) = active.get(&job.job_id) {
        warn!(
            job = %job.job_id,
            epoch = job.epoch,
            running_epoch = existing.epoch,
            "job already executing; ignoring launch"
        );
        return;
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let executor = Arc::clone(executor);
    let reports = reports.clone();
    let job_id = job.job_id.clone();
    let epoch = job.epoch;

    let handle = tokio::spawn(async move {
        let id = job.job_id.clone();
        tokio::select! {
            outcome = executor.execute(job) => {
                let report = JobReport { job_id: id, epoch, outcome };
                if reports.send(report).is_err() {
                    debug!("engine report loop is gone; completion dropped");
                }
            }
            cancel = cancel_rx => {
                // Either an explicit cancel or the dispatcher went away. The
                // execution future is dropped here and no report is sent.
                debug!(job = %id, epoch, explicit = cancel.is_ok(), "execution abandoned");
            }
        }
    });

    debug!(job = %job_id, epoch, "execution started");
    active.insert(
        job_id,
        ActiveJob {
            epoch,
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn release(job_id: &str, epoch: u64, active: &mut HashMap<JobId, ActiveJob>) {
    if !active.get(job_id).is_some_and(|job| job.epoch == epoch) {
        return;
    }
    let Some(mut job) = active.remove(job_id) else {
        return;
    };
    if let Some(cancel) = job.cancel.take() {
        if !job.handle.is_finished() && cancel.send(()).is_ok() {
            debug!(job = %job_id, epoch, "execution abandoned after terminal report");
        }
    }
}

fn cancel_all(active: &mut HashMap<JobId, ActiveJob>) {
    if active.is_empty() {
        return;
    }
    info!(count = active.len(), "cancelling in-flight executions");
    for (job_id, mut job) in active.drain() {
        if let Some(cancel) = job.cancel.take() {
            if cancel.send(()).is_err() {
                debug!(job = %job_id, "execution already finished while cancelling");
            }
        }
    }
}
