// tests/concurrency_stress.rs

use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use jobgate::fs::FileSystem;
use jobgate::jobs::JobStatus;
use jobgate::link::Signal;
use jobgate::types::SetupPayload;
use jobgate_test_utils::{RecordingExecutor, TestEngine, eventually, init_tracing};

type TestResult = Result<(), Box<dyn Error>>;

const JOBS: usize = 60;
const SAFE_OBJECTS: usize = 6;

fn payload(i: usize) -> SetupPayload {
    let mut map = SetupPayload::new();
    map.insert("cmd".to_string(), json!(format!("run {i}")));
    map
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submit_and_push_launch_every_job_once() -> TestResult {
    init_tracing();
    let t = TestEngine::builder()
        .executor(RecordingExecutor::manual())
        .build();
    let engine = Arc::clone(&t.engine);

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let engine = &engine;
            scope.spawn(move || {
                for i in (worker..JOBS).step_by(4) {
                    engine
                        .submit_job(&format!("j{i}"), &format!("so{}", i % SAFE_OBJECTS), 0)
                        .unwrap();
                }
            });
        }
        for round in 0..2 {
            let engine = &engine;
            scope.spawn(move || {
                for s in 0..SAFE_OBJECTS {
                    engine
                        .push_safe_object(&format!("so{s}"), payload(round))
                        .unwrap();
                }
            });
        }
    });

    for i in 0..JOBS {
        let job = t.engine.job(&format!("j{i}")).expect("job registered");
        assert_eq!(job.status(), JobStatus::Launched, "job j{i}");
        assert_eq!(
            job.safe_object_id(),
            Some(format!("so{}", i % SAFE_OBJECTS))
        );
    }
    for s in 0..SAFE_OBJECTS {
        assert!(t.engine.safe_object(&format!("so{s}")).unwrap().queued_jobs().is_empty());
    }

    assert!(eventually(|| t.executor.started().len() == JOBS).await);
    let ids: HashSet<String> = t.executor.started_ids().into_iter().collect();
    assert_eq!(ids.len(), JOBS, "no job launched twice");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_pull_and_arrival_post_each_value_once() -> TestResult {
    init_tracing();
    let t = TestEngine::start();
    let mut orchestrator = t.connect().await;

    let values: Vec<String> = (0..80).map(|i| format!("v{i}")).collect();
    let mut tasks = Vec::new();
    for value in &values {
        let engine = Arc::clone(&t.engine);
        let fs = t.fs.clone();
        let data_path = t.data_path(value);
        let marker_path = t.marker_path(value);
        let value = value.clone();
        tasks.push(tokio::spawn(async move {
            let pull = {
                let engine = Arc::clone(&engine);
                let value = value.clone();
                tokio::spawn(async move { engine.pull_data(&value).await })
            };
            fs.write(&data_path, value.as_bytes()).unwrap();
            fs.write(&marker_path, &[]).unwrap();
            let arrival = engine.file_created(&value).await;
            (pull.await.unwrap(), arrival)
        }));
    }
    for task in tasks {
        let (pull, arrival) = task.await?;
        pull?;
        arrival?;
    }

    let mut seen = HashSet::new();
    for _ in 0..values.len() {
        match orchestrator.recv().await? {
            Signal::PostValue { value_id, data } => {
                assert_eq!(data, value_id.as_bytes());
                assert!(seen.insert(value_id), "value posted twice");
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }
    assert!(orchestrator.is_silent_for(Duration::from_millis(200)).await?);
    assert_eq!(t.engine.registry_sizes().pull_requests, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_binding_and_arrival_never_lose_a_wakeup() -> TestResult {
    init_tracing();
    let t = TestEngine::builder()
        .executor(RecordingExecutor::manual())
        .build();
    t.engine.push_safe_object("so", payload(0))?;

    let mut tasks = Vec::new();
    for i in 0..JOBS {
        let job = format!("j{i}");
        let value = format!("in{i}");
        t.engine.submit_job(&job, "so", 1)?;

        let engine = Arc::clone(&t.engine);
        let fs = t.fs.clone();
        let marker_path = t.marker_path(&value);
        let data_path = t.data_path(&value);
        tasks.push(tokio::spawn(async move {
            let bind = {
                let engine = Arc::clone(&engine);
                let value = value.clone();
                tokio::spawn(async move { engine.set_job_parameter(&job, "in", &value, 1, 0).await })
            };
            fs.write(&data_path, b"x").unwrap();
            fs.write(&marker_path, &[]).unwrap();
            let arrival = engine.file_created(&value).await;
            (bind.await.unwrap(), arrival)
        }));
    }
    for task in tasks {
        let (bind, arrival) = task.await?;
        bind?;
        arrival?;
    }

    for i in 0..JOBS {
        assert_eq!(
            t.engine.job(&format!("j{i}")).unwrap().status(),
            JobStatus::Launched,
            "job j{i} lost its wake-up"
        );
    }
    assert_eq!(t.engine.registry_sizes().parameter_waits, 0);
    assert!(eventually(|| t.executor.started().len() == JOBS).await);
    Ok(())
}
