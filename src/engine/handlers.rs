// src/engine/handlers.rs

//! One method per inbound request, plus the two internal event sources
//! (signal files and job completions).
//!
//! Every method touches the registries one at a time: it takes what it
//! needs out of one container, releases it, and only then goes to the next.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditEventType, CHANNEL_CONNECTION, CHANNEL_LIFECYCLE};
use crate::engine::Engine;
use crate::errors::{EngineError, Result};
use crate::exec::JobReport;
use crate::fs::{HALT_MARKER, validate_value_name};
use crate::jobs::{SafeObject, lock};
use crate::link::{Credentials, ParameterAssignment, Request, SessionHandle, Signal};
use crate::tables;
use crate::types::{JobOutcome, SetupPayload};

impl Engine {
    /// `connect`: attach `session` as the active Orchestrator session.
    ///
    /// The first connect fetches the table catalog and marks the engine
    /// initialized. A connect that replaces a live session stops the old one
    /// and resets the engine first. Always answers with `connect_ack`.
    pub async fn connect(&self, credentials: Credentials, session: SessionHandle) -> Result<()> {
        let session_id = session.id();
        let replaced = self
            .link
            .attach(session.clone())
            .filter(|previous| previous.id() != session_id);

        if let Some(previous) = &replaced {
            info!(session = session_id, previous = previous.id(), "new session replaces the active one");
            previous.request_stop();
        }

        let result = self.prepare_connect(replaced.is_some());
        let accepted = result.is_ok();

        self.record_audit(AuditEvent::new(
            "orchestrator.connect",
            CHANNEL_CONNECTION,
            if accepted {
                AuditEventType::Success
            } else {
                AuditEventType::Failure
            },
            json!({
                "user": &credentials.user,
                "session": session_id,
                "replaced_session": replaced.as_ref().map(SessionHandle::id),
            }),
        ));

        let ack = Signal::ConnectAck {
            accepted,
            catalog: self.catalog(),
        };
        session.send(&ack).await?;

        info!(
            session = session_id,
            user = %credentials.user,
            accepted,
            "orchestrator connected"
        );
        if accepted {
            self.redeliver_pulls().await;
        }
        result
    }

    fn prepare_connect(&self, replacing: bool) -> Result<()> {
        if replacing {
            self.reset()?;
            self.restart_watcher()?;
        }

        if !self.initialized.load(Ordering::SeqCst) {
            let catalog = self.tables.fetch_identifier_catalog()?;
            info!(tables = catalog.len(), "table catalog fetched");
            *lock(&self.catalog) = catalog;
            self.initialized.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// `push_safe_object`: create or fetch the safe object and set it up
    /// once; every job queued on it receives the link.
    pub fn push_safe_object(&self, id: &str, payload: SetupPayload) -> Result<()> {
        let (safe_object, created) = self
            .safe_objects
            .get_or_insert_with(id, || SafeObject::new(id));

        let Some(queued) = safe_object.setup(payload) else {
            debug!(safe_object = %id, "push for an already set up safe object; no-op");
            return Ok(());
        };

        info!(
            safe_object = %id,
            created,
            queued_jobs = queued.len(),
            "safe object set up"
        );

        for job_id in queued {
            match self.jobs.get(&job_id) {
                Some(job) => job.set_safe_object(Arc::clone(&safe_object)),
                None => debug!(job = %job_id, "queued job is no longer registered"),
            }
        }
        Ok(())
    }

    /// `push_data`: store the bytes and publish the value's marker.
    pub async fn push_data(&self, value_id: &str, data: &[u8]) -> Result<()> {
        validate_value_name(value_id)?;
        self.publish_value(value_id, data).await
    }

    /// `pull_data`: register interest and deliver at once if the value is
    /// already there.
    pub async fn pull_data(&self, value_id: &str) -> Result<()> {
        validate_value_name(value_id)?;
        if !self.pulls.register(value_id) {
            debug!(value = %value_id, "pull already registered");
        }
        if self.work_area.has_marker(value_id) {
            self.emit_value(value_id).await?;
        }
        Ok(())
    }

    /// `submit_job`: link the job to its safe object, or queue it there until
    /// the safe object is set up. `expected_parameters` is the number of
    /// distinct parameters the job takes; `0` means it runs on setup alone.
    pub fn submit_job(
        &self,
        job_id: &str,
        safe_object_id: &str,
        expected_parameters: usize,
    ) -> Result<()> {
        let (job, created) = self
            .jobs
            .get_or_insert_with(job_id, || self.new_job(job_id));
        job.set_expected_parameters(expected_parameters);

        let (safe_object, _) = self
            .safe_objects
            .get_or_insert_with(safe_object_id, || SafeObject::new(safe_object_id));

        if safe_object.add_job_to_queue(job_id) {
            debug!(
                job = %job_id,
                safe_object = %safe_object_id,
                created,
                "job queued until safe object is set up"
            );
        } else {
            job.set_safe_object(safe_object);
        }
        Ok(())
    }

    /// `set_parameters`: apply each assignment in order. Stops at the first
    /// assignment that fails.
    pub async fn set_parameters(&self, job_id: &str, parameters: &[ParameterAssignment]) -> Result<()> {
        for assignment in parameters {
            self.set_job_parameter(
                job_id,
                &assignment.parameter_id,
                &assignment.value_id,
                assignment.values_expected,
                assignment.value_index,
            )
            .await?;
        }
        Ok(())
    }

    /// Bind one parameter slot of a job, registering a wait if the value is
    /// not on disk yet and the job still accepts parameters.
    pub async fn set_job_parameter(
        &self,
        job_id: &str,
        parameter: &str,
        value_id: &str,
        values_expected: usize,
        value_index: usize,
    ) -> Result<()> {
        validate_value_name(value_id)?;

        let table_id = {
            let catalog = lock(&self.catalog);
            tables::lookup(&catalog, value_id).map(str::to_string)
        };
        if let Some(table_id) = table_id {
            self.materialize_table(value_id, &table_id).await?;
        }

        let (job, _) = self
            .jobs
            .get_or_insert_with(job_id, || self.new_job(job_id));

        if job.set_parameter(parameter, value_id, values_expected, value_index)? {
            return Ok(());
        }

        if let Some(previous) = self.waits.insert(value_id, Arc::clone(&job)) {
            if !Arc::ptr_eq(&previous, &job) {
                warn!(
                    value = %value_id,
                    previous_job = %previous.id(),
                    job = %job_id,
                    "value already awaited by another job; last writer wins"
                );
            }
        }

        // The marker may have appeared between the job's check and the
        // registration above.
        if self.work_area.has_marker(value_id) {
            if let Some(waiting) = self.waits.take(value_id) {
                debug!(value = %value_id, job = %waiting.id(), "value arrived during registration");
                waiting.remove_available_dependency(value_id);
            }
        }
        Ok(())
    }

    /// `halt_all_jobs`: reset, then watch the fresh signals directory.
    pub fn halt_all_jobs(&self) -> Result<()> {
        self.reset()?;
        self.restart_watcher()
    }

    /// `heart_beat_pong`: the receive loop already recorded the contact.
    pub fn heartbeat_pong(&self) {
        debug!("heartbeat pong");
    }

    /// `vm_shutdown`: drain in-flight workers, say goodbye, and stop.
    pub async fn vm_shutdown(&self) {
        info!("orchestrator requested shutdown");
        self.record_audit(AuditEvent::new(
            "orchestrator.shutdown",
            CHANNEL_LIFECYCLE,
            AuditEventType::Info,
            json!({ "session": self.link.active_id() }),
        ));

        if tokio::time::timeout(self.options.drain_timeout, self.settle())
            .await
            .is_err()
        {
            warn!(timeout = ?self.options.drain_timeout, "drain timed out before shutdown signal");
        }

        if let Err(err) = self.link.send(&Signal::VmShutdown).await {
            warn!(error = %err, "could not send shutdown signal");
        }
        self.shutdown().await;
    }

    /// A file named `name` appeared in the signals directory.
    ///
    /// A waiting job wins over a pending pull. A name matching neither is
    /// ignored.
    pub async fn file_created(&self, name: &str) -> Result<()> {
        if name.is_empty() || name == HALT_MARKER {
            return Ok(());
        }

        if let Some(job) = self.waits.take(name) {
            debug!(value = %name, job = %job.id(), "signal resolves parameter wait");
            job.remove_available_dependency(name);
            return Ok(());
        }

        if self.pulls.contains(name) {
            return self.emit_value(name).await;
        }

        debug!(value = %name, "signal with no wait or pull; ignored");
        Ok(())
    }

    /// Report that `job_id` finished, outside the executor. Used when
    /// execution is handled elsewhere.
    pub async fn report_job_finished(&self, job_id: &str, outcome: JobOutcome) -> Result<()> {
        self.finish_job(JobReport {
            job_id: job_id.to_string(),
            epoch: self.epoch(),
            outcome,
        })
        .await
    }

    /// Emit the terminal signal for a job and evict it.
    pub(crate) async fn finish_job(&self, report: JobReport) -> Result<()> {
        let JobReport {
            job_id,
            epoch,
            outcome,
        } = report;

        if epoch != self.epoch() {
            debug!(job = %job_id, epoch, current = self.epoch(), "completion from before a reset; discarded");
            return Ok(());
        }

        let Some(job) = self.jobs.get(&job_id) else {
            warn!(job = %job_id, "completion for unknown job; ignored");
            return Ok(());
        };
        if job.epoch() != epoch {
            debug!(job = %job_id, "completion for a different incarnation of the job; discarded");
            return Ok(());
        }

        job.mark_finished(outcome.clone());
        self.launcher.release(&job_id, epoch);
        let signal = match outcome {
            JobOutcome::Done => Signal::JobDone {
                job_id: job_id.clone(),
            },
            JobOutcome::Failed(reason) => Signal::JobFail {
                job_id: job_id.clone(),
                reason,
            },
        };

        let sent = self.link.send(&signal).await;
        self.jobs.remove_entry(&job_id, &job);
        info!(job = %job_id, signal = signal.kind(), "job finished and evicted");
        sent
    }

    /// Run one request off the receive loop.
    pub fn spawn_request(&self, request: Request) {
        let Some(engine) = self.me.upgrade() else {
            return;
        };
        self.spawn_detached(async move {
            let kind = request.kind();
            if let Err(err) = engine.dispatch(request).await {
                engine.log_failure(kind, &err);
            }
        });
    }

    /// Route a request that does not need a session to its handler.
    pub async fn dispatch(&self, request: Request) -> Result<()> {
        match request {
            Request::PushSafeObject {
                safe_object_id,
                payload,
            } => self.push_safe_object(&safe_object_id, payload),
            Request::PushData { value_id, data } => self.push_data(&value_id, &data).await,
            Request::PullData { value_id } => self.pull_data(&value_id).await,
            Request::SubmitJob {
                job_id,
                safe_object_id,
                expected_parameters,
            } => self.submit_job(&job_id, &safe_object_id, expected_parameters),
            Request::SetParameters { job_id, parameters } => {
                self.set_parameters(&job_id, &parameters).await
            }
            Request::HaltAllJobs => self.halt_all_jobs(),
            Request::HeartBeatPong => {
                self.heartbeat_pong();
                Ok(())
            }
            request @ (Request::Connect { .. } | Request::VmShutdown) => Err(EngineError::Protocol(
                format!("{} must be handled by the session", request.kind()),
            )),
        }
    }

    /// Write a value and its marker. Without a watcher the marker is
    /// delivered in-process.
    async fn publish_value(&self, value_id: &str, data: &[u8]) -> Result<()> {
        self.work_area.write_value(value_id, data)?;
        debug!(value = %value_id, len = data.len(), "value published");
        if !self.options.watch_signals {
            self.file_created(value_id).await?;
        }
        Ok(())
    }

    async fn materialize_table(&self, value_id: &str, table_id: &str) -> Result<()> {
        if self.work_area.has_marker(value_id) {
            debug!(value = %value_id, table = %table_id, "table already materialized");
            return Ok(());
        }
        let bytes = self.tables.fetch_table(table_id)?;
        info!(value = %value_id, table = %table_id, len = bytes.len(), "table materialized");
        self.publish_value(value_id, &bytes).await
    }

    /// Deliver a pulled value exactly once: whoever takes the pull
    /// registration reads, sends and removes the marker. If the read or the
    /// send fails the registration is restored, so a later event or
    /// reconnect can still deliver it.
    async fn emit_value(&self, value_id: &str) -> Result<()> {
        if !self.pulls.take(value_id) {
            debug!(value = %value_id, "pull already served");
            return Ok(());
        }

        let len = match self.post_value(value_id).await {
            Ok(len) => len,
            Err(err) => {
                self.pulls.register(value_id);
                debug!(value = %value_id, "delivery failed; pull kept registered");
                return Err(err);
            }
        };

        if let Err(err) = self.work_area.remove_marker(value_id) {
            warn!(value = %value_id, error = %err, "could not remove marker after delivery");
        }
        info!(value = %value_id, len, "value posted to orchestrator");
        Ok(())
    }

    async fn post_value(&self, value_id: &str) -> Result<usize> {
        let data = self.work_area.read_value(value_id)?;
        let len = data.len();
        self.link
            .send(&Signal::PostValue {
                value_id: value_id.to_string(),
                data,
            })
            .await?;
        Ok(len)
    }

    /// Retry pulls whose value is already on disk, after a session attaches.
    async fn redeliver_pulls(&self) {
        for value_id in self.pulls.values() {
            if !self.work_area.has_marker(&value_id) {
                continue;
            }
            debug!(value = %value_id, "redelivering pulled value");
            if let Err(err) = self.emit_value(&value_id).await {
                self.log_failure("redeliver_pull", &err);
            }
        }
    }
}
