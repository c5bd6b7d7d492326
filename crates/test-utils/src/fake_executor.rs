use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use jobgate::exec::{ExecuteFuture, JobExecutor};
use jobgate::jobs::RunnableJob;
use jobgate::types::JobOutcome;

/// How a [`RecordingExecutor`] finishes the jobs it receives.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Report this outcome as soon as the job is received.
    Immediate(JobOutcome),
    /// Hold every job until [`RecordingExecutor::finish`] is called.
    Manual,
}

/// A fake execution collaborator that:
/// - records every runnable job it is handed
/// - completes it immediately or when the test says so.
#[derive(Clone)]
pub struct RecordingExecutor {
    completion: Completion,
    started: Arc<Mutex<Vec<RunnableJob>>>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<JobOutcome>>>>,
}

impl RecordingExecutor {
    pub fn new(completion: Completion) -> Self {
        Self {
            completion,
            started: Arc::new(Mutex::new(Vec::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Completion::Immediate(JobOutcome::Done))
    }

    pub fn manual() -> Self {
        Self::new(Completion::Manual)
    }

    /// Every job handed to the executor so far, in launch order.
    pub fn started(&self) -> Vec<RunnableJob> {
        self.started.lock().unwrap().clone()
    }

    pub fn started_ids(&self) -> Vec<String> {
        self.started()
            .into_iter()
            .map(|job| job.job_id)
            .collect()
    }

    pub fn launch_count(&self, job_id: &str) -> usize {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.job_id == job_id)
            .count()
    }

    /// Complete a held job. Returns false if it is not (or no longer) held.
    pub fn finish(&self, job_id: &str, outcome: JobOutcome) -> bool {
        let sender = self.pending.lock().unwrap().remove(job_id);
        match sender {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn is_holding(&self, job_id: &str) -> bool {
        self.pending
            .lock()
            .unwrap()
            .get(job_id)
            .is_some_and(|sender| !sender.is_closed())
    }
}

impl JobExecutor for RecordingExecutor {
    fn execute(&self, job: RunnableJob) -> ExecuteFuture<'_> {
        let started = Arc::clone(&self.started);
        let pending = Arc::clone(&self.pending);
        let completion = self.completion.clone();

        Box::pin(async move {
            let job_id = job.job_id.clone();
            started.lock().unwrap().push(job);

            match completion {
                Completion::Immediate(outcome) => outcome,
                Completion::Manual => {
                    let (tx, rx) = oneshot::channel();
                    pending.lock().unwrap().insert(job_id, tx);
                    match rx.await {
                        Ok(outcome) => outcome,
                        Err(_) => std::future::pending().await,
                    }
                }
            }
        })
    }
}
