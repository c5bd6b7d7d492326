//! Shared fixtures for the `jobgate` integration tests: an engine over the
//! in-memory filesystem, recording collaborators, and an orchestrator stub
//! that speaks the framed protocol.

pub mod builders;
pub mod collaborators;
pub mod fake_executor;
pub mod harness;
pub mod orchestrator;

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

pub use builders::ConfigFileBuilder;
pub use collaborators::{MemoryTables, RecordingAudit};
pub use fake_executor::{Completion, RecordingExecutor};
pub use harness::{TestEngine, TestEngineBuilder};
pub use orchestrator::OrchestratorStub;

/// Upper bound for any single awaited step in a test.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Route engine logs through the test writer, filtered by `RUST_LOG`.
///
/// Output only shows for failing tests unless run with `--nocapture`.
pub fn init_tracing() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("jobgate=info"));
        // Another test binary thread may have raced us; either subscriber is fine.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(STEP_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step did not finish within {STEP_TIMEOUT:?}"),
    }
}

/// Poll `condition` until it holds or [`STEP_TIMEOUT`] passes.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    true
}
