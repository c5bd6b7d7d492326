// src/jobs/safe_object.rs

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::jobs::lock;
use crate::types::{JobId, SafeObjectId, SetupPayload};

/// A task template that jobs are bound to.
///
/// Created empty the first time any request names it, and set up at most once.
/// Jobs that arrive before the setup wait in a FIFO queue that is drained in
/// the same critical section that applies the payload, so a queued job is
/// handed the link exactly once.
#[derive(Debug)]
pub struct SafeObject {
    id: SafeObjectId,
    state: Mutex<SafeObjectState>,
}

#[derive(Debug, Default)]
struct SafeObjectState {
    payload: Option<Arc<SetupPayload>>,
    queued_jobs: VecDeque<JobId>,
}

impl SafeObject {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: Mutex::new(SafeObjectState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_set_up(&self) -> bool {
        lock(&self.state).payload.is_some()
    }

    pub fn payload(&self) -> Option<Arc<SetupPayload>> {
        lock(&self.state).payload.clone()
    }

    /// Apply the setup payload.
    ///
    /// Returns the jobs that were queued on this safe object, in arrival
    /// order, or `None` if it was already set up (the payload is dropped).
    pub fn setup(&self, payload: SetupPayload) -> Option<Vec<JobId>> {
        let mut state = lock(&self.state);
        if state.payload.is_some() {
            debug!(safe_object = %self.id, "safe object already set up; ignoring payload");
            return None;
        }
        state.payload = Some(Arc::new(payload));
        Some(state.queued_jobs.drain(..).collect())
    }

    /// Queue `job` until setup happens.
    ///
    /// Returns `false` without queuing when the safe object is already set
    /// up; the caller links the job directly in that case.
    pub fn add_job_to_queue(&self, job: &str) -> bool {
        let mut state = lock(&self.state);
        if state.payload.is_some() {
            return false;
        }
        if !state.queued_jobs.iter().any(|queued| queued == job) {
            state.queued_jobs.push_back(job.to_string());
        }
        true
    }

    /// Snapshot of the jobs currently waiting for setup.
    pub fn queued_jobs(&self) -> Vec<JobId> {
        lock(&self.state).queued_jobs.iter().cloned().collect()
    }
}
