// src/engine/reset.rs

use std::sync::atomic::Ordering;

use serde_json::json;
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditEventType, CHANNEL_LIFECYCLE};
use crate::engine::Engine;
use crate::errors::Result;
use crate::jobs::lock;

impl Engine {
    /// Total state rebuild.
    ///
    /// 1. Bump the epoch so completions of discarded jobs are ignored.
    /// 2. Write the halt marker and drop the watcher.
    /// 3. Empty the job registry, safe object registry, pull index and wait
    ///    index, one container at a time.
    /// 4. Abandon in-flight executions.
    /// 5. Recreate the three working directories empty.
    ///
    /// A failure in step 5 is returned and leaves the directories in
    /// whatever state the filesystem left them. The caller restarts the
    /// watcher.
    pub fn reset(&self) -> Result<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(epoch, "resetting engine");

        if let Err(err) = self.work_area.signal_halt() {
            warn!(error = %err, "could not write halt marker");
        }
        let watcher = lock(&self.watcher).take();
        drop(watcher);

        let jobs = self.jobs.drain();
        for job in &jobs {
            job.discard();
        }
        let safe_objects = self.safe_objects.drain().len();
        let pulls = self.pulls.len();
        self.pulls.clear();
        let waits = self.waits.drain().len();

        self.launcher.cancel_all();

        let recreated = self.work_area.recreate();

        self.record_audit(AuditEvent::new(
            "engine.reset",
            CHANNEL_LIFECYCLE,
            if recreated.is_ok() {
                AuditEventType::Success
            } else {
                AuditEventType::Failure
            },
            json!({
                "epoch": epoch,
                "jobs": jobs.len(),
                "safe_objects": safe_objects,
                "pull_requests": pulls,
                "parameter_waits": waits,
            }),
        ));

        recreated?;
        info!(
            epoch,
            jobs = jobs.len(),
            safe_objects,
            pull_requests = pulls,
            parameter_waits = waits,
            "engine reset complete"
        );
        Ok(())
    }
}
