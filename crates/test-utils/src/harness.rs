use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jobgate::engine::{Collaborators, Engine, EngineOptions};
use jobgate::fs::{FileSystem, WorkArea};
use jobgate::fs::mock::MockFileSystem;

use crate::collaborators::{MemoryTables, RecordingAudit};
use crate::fake_executor::RecordingExecutor;
use crate::orchestrator::OrchestratorStub;

pub const SIGNALS_DIR: &str = "/work/signals";
pub const DATA_DIR: &str = "/work/data";
pub const JOBS_SIGNAL_DIR: &str = "/work/jobs-signals";

/// An engine over the in-memory filesystem with recording collaborators.
///
/// No filesystem watcher runs; markers the engine writes itself are
/// delivered in-process, and tests simulate producer output with
/// [`TestEngine::produce`].
pub struct TestEngine {
    pub engine: Arc<Engine>,
    pub fs: MockFileSystem,
    pub executor: RecordingExecutor,
    pub tables: MemoryTables,
    pub audit: RecordingAudit,
}

pub struct TestEngineBuilder {
    executor: RecordingExecutor,
    tables: MemoryTables,
    options: EngineOptions,
}

impl TestEngineBuilder {
    pub fn new() -> Self {
        Self {
            executor: RecordingExecutor::succeeding(),
            tables: MemoryTables::new(),
            options: EngineOptions {
                heartbeat_interval: Duration::from_secs(30),
                dead_connection_timeout: None,
                drain_timeout: Duration::from_secs(5),
                watch_signals: false,
            },
        }
    }

    pub fn executor(mut self, executor: RecordingExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn tables(mut self, tables: MemoryTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn heartbeat(mut self, interval: Duration, dead_after: Option<Duration>) -> Self {
        self.options.heartbeat_interval = interval;
        self.options.dead_connection_timeout = dead_after;
        self
    }

    pub fn build(self) -> TestEngine {
        let fs = MockFileSystem::new();
        let audit = RecordingAudit::new();
        let work_area = WorkArea::new(
            Arc::new(fs.clone()),
            SIGNALS_DIR,
            DATA_DIR,
            JOBS_SIGNAL_DIR,
        );
        let collaborators = Collaborators {
            tables: Arc::new(self.tables.clone()),
            executor: Arc::new(self.executor.clone()),
            audit: Arc::new(audit.clone()),
        };
        let engine = Engine::start(work_area, self.options, collaborators)
            .expect("engine should start over the mock filesystem");
        TestEngine {
            engine,
            fs,
            executor: self.executor,
            tables: self.tables,
            audit,
        }
    }
}

impl Default for TestEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngine {
    pub fn builder() -> TestEngineBuilder {
        TestEngineBuilder::new()
    }

    /// Engine with a succeeding executor and no tables.
    pub fn start() -> Self {
        TestEngineBuilder::new().build()
    }

    /// Open a session and complete the `connect` handshake.
    pub async fn connect(&self) -> OrchestratorStub {
        let mut stub = OrchestratorStub::open(&self.engine);
        stub.connect("tester")
            .await
            .expect("connect handshake should succeed");
        stub
    }

    /// Act as a running job: write a value's data and marker, then deliver
    /// the creation event the watcher would have produced.
    pub async fn produce(&self, value_id: &str, bytes: &[u8]) {
        self.fs.add_file(self.data_path(value_id), bytes.to_vec());
        self.fs.add_file(self.marker_path(value_id), Vec::new());
        self.engine
            .file_created(value_id)
            .await
            .expect("file_created should not fail");
    }

    pub fn marker_path(&self, value_id: &str) -> PathBuf {
        PathBuf::from(SIGNALS_DIR).join(value_id)
    }

    pub fn data_path(&self, value_id: &str) -> PathBuf {
        PathBuf::from(DATA_DIR).join(value_id)
    }

    pub fn has_marker(&self, value_id: &str) -> bool {
        self.fs.exists(&self.marker_path(value_id))
    }

    /// Contents of a file in the mock filesystem; panics if it is missing.
    pub fn read(&self, path: &Path) -> Vec<u8> {
        self.fs
            .read(path)
            .unwrap_or_else(|err| panic!("reading {path:?}: {err}"))
    }

    pub fn signals(&self) -> Vec<String> {
        self.fs.list(SIGNALS_DIR)
    }

    pub fn data(&self) -> Vec<String> {
        self.fs.list(DATA_DIR)
    }

    pub fn jobs_signals(&self) -> Vec<String> {
        self.fs.list(JOBS_SIGNAL_DIR)
    }
}
