// src/engine/mod.rs

//! The engine core.
//!
//! `Engine` owns the four registries, the Orchestrator link and the
//! background tasks (dispatcher, report loop, heartbeat, signal watcher).
//! It is built once by [`Engine::start`] and shared as an `Arc`; background
//! tasks only hold a `Weak` to it.
//!
//! - [`handlers`] implements one method per inbound request plus the
//!   signal-file callback and job completion.
//! - [`reset`] implements the total state rebuild.
//! - [`heartbeat`] implements the liveness loop.

pub mod handlers;
pub mod heartbeat;
pub mod reset;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::config::ConfigFile;
use crate::errors::{EngineError, ErrorKind, Result};
use crate::exec::{
    JobExecutor, JobLauncher, JobReport, NoopExecutor, ProcessExecutor, spawn_dispatcher,
};
use crate::fs::WorkArea;
use crate::jobs::{
    Job, JobRegistry, ParameterWaitIndex, PullRequestIndex, SafeObject, SafeObjectRegistry, lock,
};
use crate::link::OrchestratorLink;
use crate::tables::{Catalog, DirectoryTables, NoTables, TableSource};
use crate::watch::{OnCreated, WatcherHandle, spawn_signal_watcher};

pub use heartbeat::{HeartbeatAction, decide};

/// Tunables of a running engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub heartbeat_interval: Duration,
    /// `None` keeps a silent Orchestrator connected forever.
    pub dead_connection_timeout: Option<Duration>,
    /// Upper bound on waiting for in-flight workers at shutdown.
    pub drain_timeout: Duration,
    /// Run a filesystem watcher on the signals directory. Without one,
    /// markers the engine writes itself are delivered in-process.
    pub watch_signals: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            dead_connection_timeout: None,
            drain_timeout: Duration::from_secs(10),
            watch_signals: true,
        }
    }
}

impl EngineOptions {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            heartbeat_interval: cfg.timings.heartbeat_interval,
            dead_connection_timeout: cfg.timings.dead_connection_timeout,
            drain_timeout: cfg.timings.shutdown_drain_timeout,
            watch_signals: true,
        }
    }
}

/// External collaborators the engine calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub tables: Arc<dyn TableSource>,
    pub executor: Arc<dyn JobExecutor>,
    pub audit: Arc<dyn AuditSink>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("tables", &self.tables)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    pub fn from_config(cfg: &ConfigFile, work_area: &WorkArea) -> Self {
        let tables: Arc<dyn TableSource> = match &cfg.tables.directory {
            Some(dir) => Arc::new(DirectoryTables::new(Arc::clone(work_area.fs()), dir)),
            None => Arc::new(NoTables),
        };
        let executor: Arc<dyn JobExecutor> = if cfg.executor.enabled {
            Arc::new(ProcessExecutor::new(
                work_area.clone(),
                cfg.executor.command_key.clone(),
            ))
        } else {
            Arc::new(NoopExecutor)
        };
        Self {
            tables,
            executor,
            audit: Arc::new(TracingAuditSink),
        }
    }
}

/// Sizes of the four registries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySizes {
    pub jobs: usize,
    pub safe_objects: usize,
    pub parameter_waits: usize,
    pub pull_requests: usize,
}

impl RegistrySizes {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct Engine {
    me: Weak<Engine>,
    work_area: WorkArea,
    options: EngineOptions,
    tables: Arc<dyn TableSource>,
    audit: Arc<dyn AuditSink>,
    link: OrchestratorLink,

    jobs: JobRegistry,
    safe_objects: SafeObjectRegistry,
    waits: ParameterWaitIndex,
    pulls: PullRequestIndex,

    catalog: Mutex<Catalog>,
    initialized: AtomicBool,
    epoch: AtomicU64,
    launcher: JobLauncher,
    last_contact: Mutex<Instant>,

    watcher: Mutex<Option<WatcherHandle>>,
    in_flight: Mutex<JoinSet<()>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("work_area", &self.work_area)
            .field("options", &self.options)
            .field("epoch", &self.epoch())
            .field("sizes", &self.registry_sizes())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build the engine and start its background tasks.
    ///
    /// Fails if the signals directory cannot be watched. Must be called from
    /// within a Tokio runtime.
    pub fn start(
        work_area: WorkArea,
        options: EngineOptions,
        collaborators: Collaborators,
    ) -> Result<Arc<Engine>> {
        work_area.ensure_dirs()?;

        let (launcher, dispatch_rx) = JobLauncher::channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel::<JobReport>();
        let dispatcher = spawn_dispatcher(collaborators.executor, dispatch_rx, reports_tx);
        let (shutdown, _) = watch::channel(false);

        let engine = Arc::new_cyclic(|me| Engine {
            me: me.clone(),
            work_area,
            options,
            tables: collaborators.tables,
            audit: collaborators.audit,
            link: OrchestratorLink::new(),
            jobs: JobRegistry::new(),
            safe_objects: SafeObjectRegistry::new(),
            waits: ParameterWaitIndex::new(),
            pulls: PullRequestIndex::new(),
            catalog: Mutex::new(Catalog::new()),
            initialized: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            launcher,
            last_contact: Mutex::new(Instant::now()),
            watcher: Mutex::new(None),
            in_flight: Mutex::new(JoinSet::new()),
            background: Mutex::new(Vec::new()),
            shutdown,
        });

        let report_loop = spawn_report_loop(Arc::downgrade(&engine), reports_rx);
        let heartbeat = heartbeat::spawn_heartbeat(
            Arc::downgrade(&engine),
            options.heartbeat_interval,
            options.dead_connection_timeout,
            engine.shutdown_signal(),
        );
        lock(&engine.background).extend([dispatcher, report_loop, heartbeat]);

        engine.restart_watcher()?;

        info!(
            signals = ?engine.work_area.signals_dir(),
            data = ?engine.work_area.data_dir(),
            watch = options.watch_signals,
            "engine started"
        );
        Ok(engine)
    }

    pub fn work_area(&self) -> &WorkArea {
        &self.work_area
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn link(&self) -> &OrchestratorLink {
        &self.link
    }

    /// Current reset epoch. Starts at 0 and grows by one per reset.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn catalog(&self) -> Catalog {
        lock(&self.catalog).clone()
    }

    pub fn registry_sizes(&self) -> RegistrySizes {
        RegistrySizes {
            jobs: self.jobs.len(),
            safe_objects: self.safe_objects.len(),
            parameter_waits: self.waits.len(),
            pull_requests: self.pulls.len(),
        }
    }

    pub fn job(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.get(id)
    }

    pub fn safe_object(&self, id: &str) -> Option<Arc<SafeObject>> {
        self.safe_objects.get(id)
    }

    /// Whether a job is registered as waiting for `value`.
    pub fn is_waiting_for(&self, value: &str) -> bool {
        self.waits.contains(value)
    }

    pub fn has_pull_request(&self, value: &str) -> bool {
        self.pulls.contains(value)
    }

    pub fn is_watching(&self) -> bool {
        lock(&self.watcher)
            .as_ref()
            .is_some_and(|watcher| !watcher.is_finished())
    }

    /// Record inbound traffic from the Orchestrator.
    pub fn touch(&self) {
        *lock(&self.last_contact) = Instant::now();
    }

    /// Time since the last inbound message.
    pub fn idle(&self) -> Duration {
        lock(&self.last_contact).elapsed()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run `work` as a detached, tracked worker.
    ///
    /// Finished workers are reaped here, so the set only grows with work
    /// that is actually in flight. A panicking worker is logged and has no
    /// effect on other workers.
    pub fn spawn_detached<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = lock(&self.in_flight);
        while let Some(finished) = set.try_join_next() {
            log_worker_exit(finished);
        }
        set.spawn(work);
    }

    /// Number of detached workers not yet reaped.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Wait until every tracked detached worker, including ones spawned
    /// while waiting, has finished.
    pub async fn settle(&self) {
        loop {
            let mut set = std::mem::take(&mut *lock(&self.in_flight));
            if set.is_empty() {
                return;
            }
            while let Some(finished) = set.join_next().await {
                log_worker_exit(finished);
            }
        }
    }

    /// Stop background tasks and drain in-flight workers.
    ///
    /// Workers still running after the drain timeout are aborted.
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            debug!("engine already shut down");
            return;
        }
        info!("engine shutting down");

        drop(lock(&self.watcher).take());
        self.link.stop_active();

        if tokio::time::timeout(self.options.drain_timeout, self.settle())
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.options.drain_timeout,
                "in-flight workers did not finish in time; aborting them"
            );
            lock(&self.in_flight).abort_all();
        }

        for handle in lock(&self.background).drain(..) {
            handle.abort();
        }
        info!("engine stopped");
    }

    /// Drop the current watcher and start a new one on the signals
    /// directory. A no-op when watching is disabled.
    ///
    /// On failure no watcher is left running and the error is returned, since
    /// markers would otherwise go unnoticed.
    pub fn restart_watcher(&self) -> Result<()> {
        if !self.options.watch_signals || self.is_shutting_down() {
            return Ok(());
        }

        let engine = self.me.clone();
        let on_created: OnCreated = Arc::new(move |name: &str| {
            if let Some(engine) = engine.upgrade() {
                engine.on_signal_file(name);
            }
        });

        drop(lock(&self.watcher).take());
        let handle = spawn_signal_watcher(self.work_area.signals_dir(), on_created).map_err(|err| {
            error!(dir = ?self.work_area.signals_dir(), error = %err, "signal watcher did not start");
            err
        })?;
        *lock(&self.watcher) = Some(handle);
        Ok(())
    }

    /// Watcher callback: hand the file name to a detached worker.
    fn on_signal_file(&self, name: &str) {
        let Some(engine) = self.me.upgrade() else {
            return;
        };
        let name = name.to_string();
        self.spawn_detached(async move {
            if let Err(err) = engine.file_created(&name).await {
                engine.log_failure("file_created", &err);
            }
        });
    }

    /// Log a handler failure according to its kind.
    pub fn log_failure(&self, operation: &str, err: &EngineError) {
        match err.kind() {
            ErrorKind::Protocol => {
                warn!(operation, error = %err, "protocol error; request dropped")
            }
            ErrorKind::Dependency => {
                warn!(operation, error = %err, "dependency error; request dropped")
            }
            ErrorKind::Filesystem => error!(operation, error = %err, "filesystem error"),
            ErrorKind::Internal => error!(operation, error = %err, "internal error"),
        }
    }

    fn record_audit(&self, event: AuditEvent) {
        self.audit.record(event);
    }

    fn new_job(&self, id: &str) -> Job {
        Job::new(
            id,
            self.epoch(),
            self.work_area.clone(),
            self.launcher.clone(),
        )
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for handle in lock(&self.background).drain(..) {
            handle.abort();
        }
    }
}

fn log_worker_exit(finished: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = finished {
        if err.is_panic() {
            error!(error = %err, "detached worker panicked");
        } else {
            debug!("detached worker cancelled");
        }
    }
}

/// Feed completion reports from the dispatcher back into the engine.
fn spawn_report_loop(
    engine: Weak<Engine>,
    mut reports: mpsc::UnboundedReceiver<JobReport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            let Some(engine) = engine.upgrade() else {
                break;
            };
            let job_id = report.job_id.clone();
            if let Err(err) = engine.finish_job(report).await {
                engine.log_failure("job_finished", &err);
                debug!(job = %job_id, "completion could not be signalled");
            }
        }
        debug!("report loop finished");
    })
}
