// tests/signal_watcher.rs

use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::Event;
use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use serde_json::json;

use jobgate::engine::{Collaborators, Engine, EngineOptions};
use jobgate::errors::EngineError;
use jobgate::fs::mock::MockFileSystem;
use jobgate::fs::{HALT_MARKER, RealFileSystem, WorkArea};
use jobgate::jobs::JobStatus;
use jobgate::link::Signal;
use jobgate::types::SetupPayload;
use jobgate::watch::{OnCreated, created_file_names, spawn_signal_watcher};
use jobgate_test_utils::{
    MemoryTables, OrchestratorStub, RecordingAudit, RecordingExecutor, eventually, init_tracing,
};

type TestResult = Result<(), Box<dyn Error>>;

fn recorder() -> (OnCreated, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let on_created: OnCreated = Arc::new(move |name: &str| {
        sink.lock().unwrap().push(name.to_string());
    });
    (on_created, seen)
}

#[test]
fn only_creations_and_rename_targets_count() {
    let create = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/s/a"));
    assert_eq!(created_file_names(&create), vec!["a"]);

    let rename_to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
        .add_path(PathBuf::from("/s/b"));
    assert_eq!(created_file_names(&rename_to), vec!["b"]);

    let rename_both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
        .add_path(PathBuf::from("/tmp/b.part"))
        .add_path(PathBuf::from("/s/b"));
    assert_eq!(created_file_names(&rename_both), vec!["b"]);

    let rename_from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
        .add_path(PathBuf::from("/s/c"));
    assert!(created_file_names(&rename_from).is_empty());

    let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("/s/d"));
    assert!(created_file_names(&removed).is_empty());
}

#[tokio::test]
async fn reports_created_and_renamed_files() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let staging = tempfile::tempdir_in(dir.path().parent().unwrap_or(dir.path()))?;
    let (on_created, seen) = recorder();
    let handle = spawn_signal_watcher(dir.path(), on_created)?;
    assert_eq!(handle.dir(), dir.path());

    std::fs::write(dir.path().join("direct"), b"")?;
    let staged = staging.path().join("moved");
    std::fs::write(&staged, b"")?;
    std::fs::rename(&staged, dir.path().join("moved"))?;

    assert!(
        eventually(|| {
            let seen = seen.lock().unwrap();
            seen.contains(&"direct".to_string()) && seen.contains(&"moved".to_string())
        })
        .await
    );
    assert!(!handle.is_finished());
    Ok(())
}

#[tokio::test]
async fn halt_marker_stops_the_loop() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (on_created, seen) = recorder();
    let handle = spawn_signal_watcher(dir.path(), on_created)?;

    std::fs::write(dir.path().join(HALT_MARKER), b"")?;
    assert!(eventually(|| handle.is_finished()).await);

    std::fs::write(dir.path().join("after"), b"")?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = seen.lock().unwrap();
    assert!(!seen.contains(&"after".to_string()));
    assert!(!seen.contains(&HALT_MARKER.to_string()));
    Ok(())
}

#[test]
fn watching_a_missing_directory_fails() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let _guard = runtime.enter();
    let (on_created, _) = recorder();
    assert!(spawn_signal_watcher("/definitely/not/here", on_created).is_err());
}

#[tokio::test]
async fn engine_start_fails_when_signals_cannot_be_watched() {
    init_tracing();
    // The directories exist only in memory, so the real watcher has nothing
    // to attach to.
    let work_area = WorkArea::new(
        Arc::new(MockFileSystem::new()),
        "/jobgate-unwatchable/signals",
        "/jobgate-unwatchable/data",
        "/jobgate-unwatchable/jobs-signals",
    );
    let collaborators = Collaborators {
        tables: Arc::new(MemoryTables::new()),
        executor: Arc::new(RecordingExecutor::manual()),
        audit: Arc::new(RecordingAudit::new()),
    };
    let options = EngineOptions {
        watch_signals: true,
        ..EngineOptions::default()
    };

    let err = Engine::start(work_area, options, collaborators).unwrap_err();
    assert!(matches!(err, EngineError::WatchError(_)), "unexpected {err}");
}

struct RealEngine {
    engine: Arc<Engine>,
    executor: RecordingExecutor,
    root: tempfile::TempDir,
}

impl RealEngine {
    fn start() -> Self {
        let root = tempfile::tempdir().unwrap();
        let work_area = WorkArea::new(
            Arc::new(RealFileSystem),
            root.path().join("signals"),
            root.path().join("data"),
            root.path().join("jobs-signals"),
        );
        let executor = RecordingExecutor::manual();
        let collaborators = Collaborators {
            tables: Arc::new(MemoryTables::new()),
            executor: Arc::new(executor.clone()),
            audit: Arc::new(RecordingAudit::new()),
        };
        let options = EngineOptions {
            drain_timeout: Duration::from_secs(2),
            ..EngineOptions::default()
        };
        let engine = Engine::start(work_area, options, collaborators).unwrap();
        Self {
            engine,
            executor,
            root,
        }
    }

    /// Write a value the way a producing job would.
    fn produce(&self, value: &str, bytes: &[u8]) {
        std::fs::write(self.root.path().join("data").join(value), bytes).unwrap();
        std::fs::write(self.root.path().join("signals").join(value), b"").unwrap();
    }

    fn dir_is_empty(&self, name: &str) -> bool {
        std::fs::read_dir(self.root.path().join(name))
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
    }
}

#[tokio::test]
async fn watched_marker_launches_waiting_job() -> TestResult {
    init_tracing();
    let t = RealEngine::start();
    assert!(t.engine.is_watching());

    let mut payload = SetupPayload::new();
    payload.insert("cmd".to_string(), json!("true"));
    t.engine.push_safe_object("so", payload)?;
    t.engine.submit_job("j1", "so", 1)?;
    t.engine.set_job_parameter("j1", "in", "v", 1, 0).await?;
    assert!(t.engine.is_waiting_for("v"));

    t.produce("v", b"value");

    assert!(
        eventually(|| t
            .engine
            .job("j1")
            .is_some_and(|job| job.status() == JobStatus::Launched))
        .await
    );
    assert!(eventually(|| t.executor.launch_count("j1") == 1).await);
    Ok(())
}

#[tokio::test]
async fn pushed_value_reaches_pull_through_the_watcher() -> TestResult {
    init_tracing();
    let t = RealEngine::start();
    let mut orchestrator = OrchestratorStub::open(&t.engine);
    orchestrator.connect("tester").await?;

    t.engine.pull_data("x").await?;
    t.engine.push_data("x", b"payload").await?;

    assert_eq!(
        orchestrator.recv().await?,
        Signal::PostValue {
            value_id: "x".to_string(),
            data: b"payload".to_vec(),
        }
    );
    assert!(orchestrator.is_silent_for(Duration::from_millis(200)).await?);
    Ok(())
}

#[tokio::test]
async fn halt_recreates_directories_and_restarts_watcher() -> TestResult {
    init_tracing();
    let t = RealEngine::start();

    t.engine.push_data("old", b"stale").await?;
    t.engine.set_job_parameter("j1", "in", "pending", 1, 0).await?;
    assert!(!t.dir_is_empty("data"));

    t.engine.halt_all_jobs()?;

    assert!(t.dir_is_empty("signals"));
    assert!(t.dir_is_empty("data"));
    assert!(t.dir_is_empty("jobs-signals"));
    assert!(t.engine.registry_sizes().is_empty());
    assert!(t.engine.is_watching());

    // The fresh watcher sees new markers.
    let mut payload = SetupPayload::new();
    payload.insert("cmd".to_string(), json!("true"));
    t.engine.push_safe_object("so", payload)?;
    t.engine.submit_job("j2", "so", 1)?;
    t.engine.set_job_parameter("j2", "in", "fresh", 1, 0).await?;
    t.produce("fresh", b"new");

    assert!(eventually(|| t.executor.launch_count("j2") == 1).await);
    Ok(())
}
