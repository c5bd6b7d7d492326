// src/jobs/job.rs

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::errors::{EngineError, Result};
use crate::exec::JobLauncher;
use crate::fs::WorkArea;
use crate::jobs::binding::ParameterBinding;
use crate::jobs::lock;
use crate::jobs::safe_object::SafeObject;
use crate::types::{JobId, JobOutcome, SafeObjectId, SetupPayload, ValueId};

/// Internal lifecycle of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    /// Waiting for its safe object and/or parameters.
    Pending,
    /// Handed to the executor; inputs are frozen.
    Launched,
    /// A terminal signal was emitted for it.
    Finished(JobOutcome),
    /// Thrown away by a reset without a terminal signal.
    Discarded,
}

/// Public, read-only view of a job's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    AwaitingInputs {
        /// True while no set-up safe object is linked.
        safe_object: bool,
        /// Parameters that are declared but not fully resolved, plus any
        /// parameters announced by `submit_job` but not declared yet.
        unresolved_parameters: usize,
    },
    Launched,
    Done,
    Failed,
    Discarded,
}

/// A parameter with all of its values available, in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParameter {
    pub name: String,
    pub values: Vec<ValueId>,
}

/// Snapshot of a job at the moment it became runnable.
#[derive(Debug, Clone)]
pub struct RunnableJob {
    pub job_id: JobId,
    /// Reset epoch the job was created in.
    pub epoch: u64,
    pub safe_object_id: SafeObjectId,
    pub payload: Arc<SetupPayload>,
    pub parameters: Vec<ResolvedParameter>,
}

#[derive(Debug)]
struct SafeObjectLink {
    object: Arc<SafeObject>,
    payload: Option<Arc<SetupPayload>>,
}

#[derive(Debug)]
struct JobState {
    link: Option<SafeObjectLink>,
    bindings: BTreeMap<String, ParameterBinding>,
    expected_parameters: Option<usize>,
    phase: Phase,
}

/// A unit of work waiting for its inputs.
///
/// A job is handed to the executor exactly once, at the first moment it has a
/// set-up safe object, its announced number of parameters declared, and every
/// one of them resolved. The launch
/// happens inside the job's own critical section, so concurrent notifications
/// cannot launch it twice.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    epoch: u64,
    work_area: WorkArea,
    launcher: JobLauncher,
    state: Mutex<JobState>,
}

impl Job {
    pub fn new(id: &str, epoch: u64, work_area: WorkArea, launcher: JobLauncher) -> Self {
        Self {
            id: id.to_string(),
            epoch,
            work_area,
            launcher,
            state: Mutex::new(JobState {
                link: None,
                bindings: BTreeMap::new(),
                expected_parameters: None,
                phase: Phase::Pending,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Link the safe object. A job keeps the first link it receives.
    pub fn set_safe_object(&self, safe_object: Arc<SafeObject>) {
        let payload = safe_object.payload();
        let mut state = lock(&self.state);

        match &state.link {
            Some(existing) if Arc::ptr_eq(&existing.object, &safe_object) => {
                debug!(job = %self.id, safe_object = %safe_object.id(), "safe object already linked");
                return;
            }
            Some(existing) => {
                warn!(
                    job = %self.id,
                    linked = %existing.object.id(),
                    ignored = %safe_object.id(),
                    "job already linked to a different safe object; ignoring"
                );
                return;
            }
            None => {}
        }

        debug!(job = %self.id, safe_object = %safe_object.id(), "safe object linked");
        state.link = Some(SafeObjectLink {
            object: safe_object,
            payload,
        });
        self.try_launch(&mut state);
    }

    /// Announce how many distinct parameters the job takes. Ignored once
    /// the job has left `Pending`.
    pub fn set_expected_parameters(&self, count: usize) {
        let mut state = lock(&self.state);
        if state.phase != Phase::Pending {
            return;
        }
        state.expected_parameters = Some(count);
        self.try_launch(&mut state);
    }

    /// Record that value `index` of `parameter` is `value_id`.
    ///
    /// Returns `true` when the caller must not register a wait: either the
    /// value's marker already exists and the slot is bound resolved, or the
    /// job has left `Pending` and the binding was ignored.
    pub fn set_parameter(
        &self,
        parameter: &str,
        value_id: &str,
        values_expected: usize,
        index: usize,
    ) -> Result<bool> {
        let present = self.work_area.has_marker(value_id);
        let mut state = lock(&self.state);

        if state.phase != Phase::Pending {
            warn!(
                job = %self.id,
                parameter = %parameter,
                value = %value_id,
                "job no longer accepts parameters; ignoring"
            );
            return Ok(true);
        }

        let binding = match state.bindings.entry(parameter.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(
                ParameterBinding::new(parameter, values_expected).map_err(|source| {
                    EngineError::Binding {
                        job: self.id.clone(),
                        source,
                    }
                })?,
            ),
        };

        binding
            .check(values_expected, index)
            .and_then(|()| binding.bind(index, value_id, present))
            .map_err(|source| EngineError::Binding {
                job: self.id.clone(),
                source,
            })?;

        debug!(
            job = %self.id,
            parameter = %parameter,
            value = %value_id,
            index,
            values_expected,
            arrived = binding.arrived(),
            present,
            "parameter slot bound"
        );

        self.try_launch(&mut state);
        Ok(present)
    }

    /// Mark the pending slot(s) holding `value_id` as available.
    ///
    /// Returns `true` if any slot changed.
    pub fn remove_available_dependency(&self, value_id: &str) -> bool {
        let mut state = lock(&self.state);
        if state.phase != Phase::Pending {
            debug!(job = %self.id, value = %value_id, "dependency arrived for inactive job");
            return false;
        }

        let changed: usize = state
            .bindings
            .values_mut()
            .map(|binding| binding.resolve(value_id))
            .sum();

        if changed == 0 {
            debug!(job = %self.id, value = %value_id, "no pending slot for value");
            return false;
        }

        debug!(job = %self.id, value = %value_id, slots = changed, "dependency resolved");
        self.try_launch(&mut state);
        true
    }

    /// Drop the job as part of a reset. A discarded job never launches.
    pub fn discard(&self) {
        let mut state = lock(&self.state);
        if matches!(state.phase, Phase::Pending | Phase::Launched) {
            state.phase = Phase::Discarded;
        }
    }

    pub(crate) fn mark_finished(&self, outcome: JobOutcome) {
        let mut state = lock(&self.state);
        if state.phase != Phase::Discarded {
            state.phase = Phase::Finished(outcome);
        }
    }

    pub fn status(&self) -> JobStatus {
        let state = lock(&self.state);
        match &state.phase {
            Phase::Pending => {
                let declared_unresolved = state
                    .bindings
                    .values()
                    .filter(|binding| !binding.is_resolved())
                    .count();
                let undeclared = state
                    .expected_parameters
                    .map_or(0, |n| n.saturating_sub(state.bindings.len()));
                JobStatus::AwaitingInputs {
                    safe_object: !Self::has_payload(&state),
                    unresolved_parameters: declared_unresolved + undeclared,
                }
            }
            Phase::Launched => JobStatus::Launched,
            Phase::Finished(JobOutcome::Done) => JobStatus::Done,
            Phase::Finished(JobOutcome::Failed(_)) => JobStatus::Failed,
            Phase::Discarded => JobStatus::Discarded,
        }
    }

    pub fn safe_object_id(&self) -> Option<SafeObjectId> {
        lock(&self.state)
            .link
            .as_ref()
            .map(|link| link.object.id().to_string())
    }

    /// Values this job is still waiting for.
    pub fn pending_values(&self) -> Vec<ValueId> {
        lock(&self.state)
            .bindings
            .values()
            .flat_map(|binding| binding.pending_values().map(str::to_string))
            .collect()
    }

    fn has_payload(state: &JobState) -> bool {
        state
            .link
            .as_ref()
            .is_some_and(|link| link.payload.is_some())
    }

    fn try_launch(&self, state: &mut JobState) {
        if state.phase != Phase::Pending {
            return;
        }

        let Some(link) = &state.link else {
            return;
        };
        let Some(payload) = &link.payload else {
            return;
        };

        if !state.bindings.values().all(ParameterBinding::is_resolved) {
            return;
        }

        // Only `submit_job` knows how many parameters the job takes.
        let Some(expected) = state.expected_parameters else {
            return;
        };
        if state.bindings.len() < expected {
            return;
        }

        let runnable = RunnableJob {
            job_id: self.id.clone(),
            epoch: self.epoch,
            safe_object_id: link.object.id().to_string(),
            payload: Arc::clone(payload),
            parameters: state
                .bindings
                .values()
                .map(|binding| ResolvedParameter {
                    name: binding.parameter().to_string(),
                    values: binding.value_ids(),
                })
                .collect(),
        };

        state.phase = Phase::Launched;
        info!(
            job = %self.id,
            safe_object = %runnable.safe_object_id,
            parameters = runnable.parameters.len(),
            "job runnable; handing to executor"
        );
        self.launcher.launch(runnable);
    }
}
