// tests/engine_properties.rs

use std::error::Error;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use jobgate::jobs::{JobStatus, ResolvedParameter};
use jobgate::link::Signal;
use jobgate::types::{JobOutcome, SetupPayload};
use jobgate_test_utils::{
    RecordingExecutor, TestEngine, eventually, init_tracing, with_timeout,
};

type TestResult = Result<(), Box<dyn Error>>;

fn payload(cmd: &str) -> SetupPayload {
    let mut map = SetupPayload::new();
    map.insert("cmd".to_string(), json!(cmd));
    map
}

fn manual_engine() -> TestEngine {
    TestEngine::builder()
        .executor(RecordingExecutor::manual())
        .build()
}

fn is_launched(t: &TestEngine, job: &str) -> bool {
    t.engine
        .job(job)
        .is_some_and(|job| job.status() == JobStatus::Launched)
}

#[tokio::test]
async fn submit_before_push_links_and_launches() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.submit_job("j1", "so1", 0)?;
    assert!(!is_launched(&t, "j1"), "job must wait for the safe object setup");
    assert_eq!(
        t.engine.safe_object("so1").map(|so| so.queued_jobs()),
        Some(vec!["j1".to_string()])
    );

    t.engine.push_safe_object("so1", payload("echo one"))?;

    assert!(is_launched(&t, "j1"));
    let job = t.engine.job("j1").expect("job registered");
    assert_eq!(job.safe_object_id().as_deref(), Some("so1"));
    assert!(t.engine.safe_object("so1").unwrap().queued_jobs().is_empty());

    assert!(eventually(|| t.executor.started().len() == 1).await);
    let started = &t.executor.started()[0];
    assert_eq!(started.job_id, "j1");
    assert_eq!(started.payload.get("cmd"), Some(&json!("echo one")));
    Ok(())
}

#[tokio::test]
async fn push_before_submit_links_and_launches() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.push_safe_object("so1", payload("echo one"))?;
    t.engine.submit_job("j1", "so1", 0)?;

    assert!(is_launched(&t, "j1"));
    assert!(t.engine.safe_object("so1").unwrap().queued_jobs().is_empty());
    assert!(eventually(|| t.executor.started().len() == 1).await);
    assert_eq!(
        t.executor.started()[0].payload.get("cmd"),
        Some(&json!("echo one"))
    );
    Ok(())
}

#[tokio::test]
async fn second_push_keeps_first_payload() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.push_safe_object("so1", payload("first"))?;
    t.engine.push_safe_object("so1", payload("second"))?;

    let so = t.engine.safe_object("so1").expect("safe object registered");
    assert_eq!(so.payload().unwrap().get("cmd"), Some(&json!("first")));

    t.engine.submit_job("j1", "so1", 0)?;
    assert!(eventually(|| t.executor.started().len() == 1).await);
    assert_eq!(
        t.executor.started()[0].payload.get("cmd"),
        Some(&json!("first"))
    );
    Ok(())
}

#[tokio::test]
async fn queued_jobs_are_all_linked_on_setup() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.submit_job("j1", "so1", 0)?;
    t.engine.submit_job("j2", "so1", 0)?;
    t.engine.submit_job("j1", "so1", 0)?;
    assert_eq!(
        t.engine.safe_object("so1").unwrap().queued_jobs(),
        vec!["j1".to_string(), "j2".to_string()]
    );

    t.engine.push_safe_object("so1", payload("x"))?;
    assert!(is_launched(&t, "j1"));
    assert!(is_launched(&t, "j2"));
    assert!(eventually(|| t.executor.started().len() == 2).await);
    assert_eq!(t.executor.launch_count("j1"), 1);
    Ok(())
}

#[tokio::test]
async fn array_parameter_waits_for_every_index() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.push_safe_object("so1", payload("x"))?;
    t.engine.submit_job("j1", "so1", 1)?;

    t.engine.set_job_parameter("j1", "arr", "a2", 3, 2).await?;
    t.engine.set_job_parameter("j1", "arr", "a0", 3, 0).await?;
    t.produce("a0", b"0").await;
    t.produce("a2", b"2").await;
    assert!(!is_launched(&t, "j1"), "index 1 has not arrived yet");
    assert_eq!(
        t.engine.job("j1").unwrap().status(),
        JobStatus::AwaitingInputs {
            safe_object: false,
            unresolved_parameters: 1,
        }
    );

    t.produce("a1", b"1").await;
    assert!(!is_launched(&t, "j1"), "index 1 is produced but not bound");

    t.engine.set_job_parameter("j1", "arr", "a1", 3, 1).await?;
    assert!(is_launched(&t, "j1"));

    assert!(eventually(|| t.executor.started().len() == 1).await);
    assert_eq!(
        t.executor.started()[0].parameters,
        vec![ResolvedParameter {
            name: "arr".to_string(),
            values: vec!["a0".to_string(), "a1".to_string(), "a2".to_string()],
        }]
    );
    Ok(())
}

#[tokio::test]
async fn pull_before_value_is_delivered_once_on_arrival() -> TestResult {
    init_tracing();
    let t = TestEngine::start();
    let mut orchestrator = t.connect().await;

    t.engine.pull_data("x").await?;
    assert!(t.engine.has_pull_request("x"));
    assert!(orchestrator.is_silent_for(Duration::from_millis(100)).await?);

    t.produce("x", b"hello").await;
    assert_eq!(
        orchestrator.recv().await?,
        Signal::PostValue {
            value_id: "x".to_string(),
            data: b"hello".to_vec(),
        }
    );

    // A repeated creation event must not deliver twice.
    t.engine.file_created("x").await?;
    assert!(orchestrator.is_silent_for(Duration::from_millis(100)).await?);
    assert!(!t.engine.has_pull_request("x"));
    assert!(!t.has_marker("x"));
    Ok(())
}

#[tokio::test]
async fn pull_after_value_is_delivered_immediately_once() -> TestResult {
    init_tracing();
    let t = TestEngine::start();
    let mut orchestrator = t.connect().await;

    t.engine.push_data("x", b"ready").await?;
    assert!(orchestrator.is_silent_for(Duration::from_millis(50)).await?);

    t.engine.pull_data("x").await?;
    assert_eq!(
        orchestrator.recv().await?,
        Signal::PostValue {
            value_id: "x".to_string(),
            data: b"ready".to_vec(),
        }
    );

    t.engine.file_created("x").await?;
    assert!(orchestrator.is_silent_for(Duration::from_millis(100)).await?);
    Ok(())
}

#[tokio::test]
async fn pull_survives_delivery_without_a_session() -> TestResult {
    init_tracing();
    let t = TestEngine::start();

    t.engine.pull_data("x").await?;
    t.fs.add_file(t.data_path("x"), b"late".to_vec());
    t.fs.add_file(t.marker_path("x"), Vec::new());
    assert!(t.engine.file_created("x").await.is_err(), "nobody to post to");
    assert!(t.engine.has_pull_request("x"));
    assert!(t.has_marker("x"));

    let mut orchestrator = t.connect().await;
    assert_eq!(
        orchestrator.recv().await?,
        Signal::PostValue {
            value_id: "x".to_string(),
            data: b"late".to_vec(),
        }
    );
    assert!(!t.engine.has_pull_request("x"));
    assert!(!t.has_marker("x"));
    assert!(orchestrator.is_silent_for(Duration::from_millis(100)).await?);
    Ok(())
}

#[tokio::test]
async fn pull_survives_a_marker_without_data() -> TestResult {
    init_tracing();
    let t = TestEngine::start();
    let mut orchestrator = t.connect().await;

    t.engine.pull_data("x").await?;
    t.fs.add_file(t.marker_path("x"), Vec::new());
    assert!(t.engine.file_created("x").await.is_err());
    assert!(t.engine.has_pull_request("x"));
    assert!(orchestrator.is_silent_for(Duration::from_millis(50)).await?);

    t.produce("x", b"now").await;
    assert_eq!(
        orchestrator.recv().await?,
        Signal::PostValue {
            value_id: "x".to_string(),
            data: b"now".to_vec(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn parameter_wait_wins_over_pull() -> TestResult {
    init_tracing();
    let t = manual_engine();
    let mut orchestrator = t.connect().await;

    t.engine.set_job_parameter("j1", "in", "v", 1, 0).await?;
    t.engine.pull_data("v").await?;
    assert!(t.engine.is_waiting_for("v"));

    t.produce("v", b"data").await;

    assert!(!t.engine.is_waiting_for("v"));
    assert!(t.engine.has_pull_request("v"), "pull stays registered");
    assert!(orchestrator.is_silent_for(Duration::from_millis(100)).await?);
    Ok(())
}

#[tokio::test]
async fn value_already_present_registers_no_wait() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.push_data("v", b"data").await?;
    t.engine.set_job_parameter("j1", "in", "v", 1, 0).await?;

    assert!(!t.engine.is_waiting_for("v"));
    assert_eq!(t.engine.job("j1").unwrap().pending_values(), Vec::<String>::new());
    Ok(())
}

#[tokio::test]
async fn reused_value_wait_goes_to_last_writer() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.set_job_parameter("j1", "in", "shared", 1, 0).await?;
    t.engine.set_job_parameter("j2", "in", "shared", 1, 0).await?;
    assert_eq!(t.engine.registry_sizes().parameter_waits, 1);

    t.produce("shared", b"s").await;

    assert!(t.engine.job("j2").unwrap().pending_values().is_empty());
    assert_eq!(
        t.engine.job("j1").unwrap().pending_values(),
        vec!["shared".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn launched_job_does_not_take_over_a_wait() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.set_job_parameter("j2", "in", "shared", 1, 0).await?;
    t.engine.push_safe_object("so1", payload("x"))?;
    t.engine.submit_job("j1", "so1", 0)?;
    assert!(is_launched(&t, "j1"));

    t.engine.set_job_parameter("j1", "late", "shared", 1, 0).await?;
    assert_eq!(t.engine.registry_sizes().parameter_waits, 1);

    t.produce("shared", b"s").await;
    assert!(t.engine.job("j2").unwrap().pending_values().is_empty());
    assert!(!t.engine.is_waiting_for("shared"));
    Ok(())
}

#[tokio::test]
async fn reset_clears_registries_and_directories() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.submit_job("j1", "so1", 0)?;
    t.engine.push_safe_object("so2", payload("x"))?;
    t.engine.pull_data("p1").await?;
    t.engine.set_job_parameter("j1", "in", "w1", 1, 0).await?;
    t.engine.push_data("d1", b"bytes").await?;

    let before = t.engine.registry_sizes();
    assert_eq!(before.jobs, 1);
    assert_eq!(before.safe_objects, 2);
    assert_eq!(before.pull_requests, 1);
    assert_eq!(before.parameter_waits, 1);
    assert!(!t.signals().is_empty());
    assert!(!t.data().is_empty());

    let job = t.engine.job("j1").unwrap();
    let epoch = t.engine.epoch();

    t.engine.halt_all_jobs()?;

    assert!(t.engine.registry_sizes().is_empty());
    assert!(t.signals().is_empty());
    assert!(t.data().is_empty());
    assert!(t.jobs_signals().is_empty());
    assert_eq!(t.engine.epoch(), epoch + 1);
    assert_eq!(job.status(), JobStatus::Discarded);
    assert_eq!(t.audit.count("engine.reset"), 1);

    // A discarded job never launches, even if its inputs show up.
    assert!(!job.remove_available_dependency("w1"));
    assert_eq!(job.status(), JobStatus::Discarded);
    Ok(())
}

#[tokio::test]
async fn reset_abandons_running_jobs_without_signal() -> TestResult {
    init_tracing();
    let t = manual_engine();
    let mut orchestrator = t.connect().await;

    t.engine.push_safe_object("so1", payload("x"))?;
    t.engine.submit_job("j1", "so1", 0)?;
    assert!(eventually(|| t.executor.is_holding("j1")).await);

    t.engine.halt_all_jobs()?;

    assert!(eventually(|| !t.executor.is_holding("j1")).await);
    assert!(!t.executor.finish("j1", JobOutcome::Done));
    assert!(orchestrator.is_silent_for(Duration::from_millis(100)).await?);
    Ok(())
}

#[tokio::test]
async fn resubmitted_job_after_reset_runs_in_new_epoch() -> TestResult {
    init_tracing();
    let t = manual_engine();
    let mut orchestrator = t.connect().await;

    t.engine.push_safe_object("so1", payload("x"))?;
    t.engine.submit_job("j1", "so1", 0)?;
    assert!(eventually(|| t.executor.is_holding("j1")).await);
    t.engine.halt_all_jobs()?;
    assert!(eventually(|| !t.executor.is_holding("j1")).await);

    t.engine.push_safe_object("so1", payload("y"))?;
    t.engine.submit_job("j1", "so1", 0)?;
    assert_eq!(t.engine.job("j1").map(|job| job.epoch()), Some(1));
    assert!(eventually(|| t.executor.is_holding("j1")).await);
    assert_eq!(t.executor.launch_count("j1"), 2);

    assert!(t.executor.finish("j1", JobOutcome::Done));
    assert_eq!(orchestrator.recv().await?, Signal::JobDone { job_id: "j1".to_string() });
    assert!(eventually(|| t.engine.job("j1").is_none()).await);
    Ok(())
}

#[tokio::test]
async fn externally_reported_completion_is_signalled() -> TestResult {
    init_tracing();
    let t = manual_engine();
    let mut orchestrator = t.connect().await;

    t.engine.submit_job("j1", "so1", 0)?;
    t.engine.report_job_finished("j1", JobOutcome::Failed("lost".to_string())).await?;
    assert_eq!(
        orchestrator.recv().await?,
        Signal::JobFail {
            job_id: "j1".to_string(),
            reason: "lost".to_string(),
        }
    );
    assert!(t.engine.job("j1").is_none());

    // Unknown jobs are ignored.
    t.engine.report_job_finished("nope", JobOutcome::Done).await?;
    assert!(orchestrator.is_silent_for(Duration::from_millis(100)).await?);
    Ok(())
}

#[tokio::test]
async fn job_id_is_reusable_after_external_completion() -> TestResult {
    init_tracing();
    let t = manual_engine();
    let mut orchestrator = t.connect().await;

    t.engine.push_safe_object("so1", payload("x"))?;
    t.engine.submit_job("j1", "so1", 0)?;
    assert!(eventually(|| t.executor.is_holding("j1")).await);

    t.engine.report_job_finished("j1", JobOutcome::Done).await?;
    assert_eq!(orchestrator.recv().await?, Signal::JobDone { job_id: "j1".to_string() });
    assert!(eventually(|| !t.executor.is_holding("j1")).await);

    t.engine.submit_job("j1", "so1", 0)?;
    assert!(is_launched(&t, "j1"));
    assert!(eventually(|| t.executor.launch_count("j1") == 2).await);
    assert!(eventually(|| t.executor.is_holding("j1")).await);

    assert!(t.executor.finish("j1", JobOutcome::Done));
    assert_eq!(orchestrator.recv().await?, Signal::JobDone { job_id: "j1".to_string() });
    Ok(())
}

#[tokio::test]
async fn done_job_is_signalled_and_evicted() -> TestResult {
    init_tracing();
    let t = TestEngine::start();
    let mut orchestrator = t.connect().await;

    t.engine.push_safe_object("so1", payload("x"))?;
    t.engine.submit_job("j1", "so1", 0)?;

    let signal = with_timeout(orchestrator.recv()).await?;
    assert_eq!(signal, Signal::JobDone { job_id: "j1".to_string() });
    assert!(eventually(|| t.engine.job("j1").is_none()).await);
    Ok(())
}

#[tokio::test]
async fn failed_job_is_signalled_and_evicted() -> TestResult {
    init_tracing();
    let t = TestEngine::builder()
        .executor(RecordingExecutor::new(jobgate_test_utils::Completion::Immediate(
            JobOutcome::Failed("boom".to_string()),
        )))
        .build();
    let mut orchestrator = t.connect().await;

    t.engine.push_safe_object("so1", payload("x"))?;
    t.engine.submit_job("j1", "so1", 0)?;

    assert_eq!(
        orchestrator.recv().await?,
        Signal::JobFail {
            job_id: "j1".to_string(),
            reason: "boom".to_string(),
        }
    );
    assert!(eventually(|| t.engine.job("j1").is_none()).await);
    Ok(())
}

#[tokio::test]
async fn invalid_requests_are_rejected_as_protocol_errors() -> TestResult {
    init_tracing();
    let t = manual_engine();

    let err = t.engine.push_data("../escape", b"x").await.unwrap_err();
    assert_eq!(err.kind(), jobgate::errors::ErrorKind::Protocol);

    let err = t
        .engine
        .set_job_parameter("j1", "in", "v", 0, 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), jobgate::errors::ErrorKind::Protocol);

    t.engine.set_job_parameter("j1", "in", "v", 2, 0).await?;
    let err = t
        .engine
        .set_job_parameter("j1", "in", "other", 2, 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), jobgate::errors::ErrorKind::Protocol);
    Ok(())
}

#[tokio::test]
async fn table_value_is_materialized_before_binding() -> TestResult {
    init_tracing();
    let tables = jobgate_test_utils::MemoryTables::new().with_table("patients", "t-1", b"rows".to_vec());
    let t = TestEngine::builder()
        .executor(RecordingExecutor::manual())
        .tables(tables)
        .build();
    let mut orchestrator = jobgate_test_utils::OrchestratorStub::open(&t.engine);
    let ack = orchestrator.connect("tester").await?;
    match ack {
        Signal::ConnectAck { catalog, .. } => {
            assert_eq!(catalog.get("patients").map(String::as_str), Some("t-1"));
        }
        other => panic!("unexpected {other:?}"),
    }

    t.engine.set_job_parameter("j1", "in", "patients", 1, 0).await?;
    t.engine.set_job_parameter("j1", "ids", "t-1", 1, 0).await?;

    assert!(!t.engine.is_waiting_for("patients"));
    assert!(!t.engine.is_waiting_for("t-1"));
    assert!(t.engine.job("j1").unwrap().pending_values().is_empty());
    assert_eq!(t.read(&t.data_path("patients")), b"rows".to_vec());
    assert_eq!(t.tables.catalog_fetches(), 1);
    assert_eq!(t.tables.table_fetches(), 2);
    Ok(())
}

/// Steps of the single-parameter arrival-order property.
#[derive(Debug, Clone, Copy)]
enum Step {
    Submit,
    Push,
    Bind,
    Produce,
}

const STEPS: [Step; 4] = [Step::Submit, Step::Push, Step::Bind, Step::Produce];

async fn apply(t: &TestEngine, step: Step) {
    match step {
        Step::Submit => t.engine.submit_job("j1", "so1", 1).unwrap(),
        Step::Push => t.engine.push_safe_object("so1", payload("run")).unwrap(),
        Step::Bind => t
            .engine
            .set_job_parameter("j1", "input", "v1", 1, 0)
            .await
            .unwrap(),
        Step::Produce => t.produce("v1", b"payload").await,
    }
}

/// Steps of a two-parameter job; every `SetParameters` may come after the
/// job already has its safe object.
#[derive(Debug, Clone, Copy)]
enum PairStep {
    Submit,
    Push,
    Bind(&'static str),
    Produce(&'static str),
}

const PAIR_STEPS: [PairStep; 6] = [
    PairStep::Submit,
    PairStep::Push,
    PairStep::Bind("left"),
    PairStep::Bind("right"),
    PairStep::Produce("left"),
    PairStep::Produce("right"),
];

async fn apply_pair(t: &TestEngine, step: PairStep) {
    match step {
        PairStep::Submit => t.engine.submit_job("j1", "so1", 2).unwrap(),
        PairStep::Push => t.engine.push_safe_object("so1", payload("run")).unwrap(),
        PairStep::Bind(side) => t
            .engine
            .set_job_parameter("j1", side, &format!("v-{side}"), 1, 0)
            .await
            .unwrap(),
        PairStep::Produce(side) => t.produce(&format!("v-{side}"), side.as_bytes()).await,
    }
}

#[tokio::test]
async fn parameters_after_setup_still_gate_launch() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.submit_job("j1", "so1", 1)?;
    t.engine.push_safe_object("so1", payload("run"))?;
    assert!(!is_launched(&t, "j1"), "announced parameter is not bound yet");
    assert_eq!(
        t.engine.job("j1").unwrap().status(),
        JobStatus::AwaitingInputs {
            safe_object: false,
            unresolved_parameters: 1,
        }
    );

    t.engine.set_job_parameter("j1", "input", "v1", 1, 0).await?;
    assert!(!is_launched(&t, "j1"), "value has not arrived");
    assert!(t.engine.is_waiting_for("v1"));

    t.produce("v1", b"payload").await;
    assert!(is_launched(&t, "j1"));
    assert!(eventually(|| t.executor.started().len() == 1).await);
    assert_eq!(t.executor.started()[0].parameters.len(), 1);
    Ok(())
}

#[tokio::test]
async fn job_never_submitted_does_not_launch() -> TestResult {
    init_tracing();
    let t = manual_engine();

    t.engine.push_safe_object("so1", payload("run"))?;
    t.engine.set_job_parameter("j1", "input", "v1", 1, 0).await?;
    t.produce("v1", b"payload").await;

    assert!(!is_launched(&t, "j1"));
    assert!(t.executor.started().is_empty());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn two_parameter_job_waits_for_both_in_any_order(
        order in Just(PAIR_STEPS.to_vec()).prop_shuffle()
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let t = manual_engine();

            let (last, head) = order.split_last().unwrap();
            for step in head {
                apply_pair(&t, *step).await;
                assert!(!is_launched(&t, "j1"), "launched early after {step:?} in {order:?}");
            }
            apply_pair(&t, *last).await;
            assert!(is_launched(&t, "j1"), "not launched after {order:?}");

            assert!(eventually(|| t.executor.started().len() == 1).await);
            let names: Vec<String> = t.executor.started()[0]
                .parameters
                .iter()
                .map(|parameter| parameter.name.clone())
                .collect();
            assert_eq!(names, vec!["left".to_string(), "right".to_string()]);
        });
    }

    #[test]
    fn any_arrival_order_launches_once_with_full_inputs(
        order in Just(STEPS.to_vec()).prop_shuffle()
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let t = manual_engine();

            let (last, head) = order.split_last().unwrap();
            for step in head {
                apply(&t, *step).await;
                assert!(!is_launched(&t, "j1"), "launched early after {step:?} in {order:?}");
            }
            apply(&t, *last).await;
            assert!(is_launched(&t, "j1"), "not launched after {order:?}");

            assert!(eventually(|| t.executor.started().len() == 1).await);
            let started = &t.executor.started()[0];
            assert_eq!(started.safe_object_id, "so1");
            assert_eq!(started.payload.get("cmd"), Some(&json!("run")));
            assert_eq!(
                started.parameters,
                vec![ResolvedParameter {
                    name: "input".to_string(),
                    values: vec!["v1".to_string()],
                }]
            );
        });
    }

    #[test]
    fn array_indices_resolve_in_any_order(
        order in Just((0..6).collect::<Vec<usize>>()).prop_shuffle()
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let t = manual_engine();
            t.engine.push_safe_object("so1", payload("run")).unwrap();
            t.engine.submit_job("j1", "so1", 1).unwrap();

            let (last, head) = order.split_last().unwrap();
            for event in head.iter().chain(std::iter::once(last)) {
                let index = event % 3;
                let value = format!("a{index}");
                if *event < 3 {
                    t.engine.set_job_parameter("j1", "arr", &value, 3, index).await.unwrap();
                } else {
                    t.produce(&value, value.as_bytes()).await;
                }
                if event != last {
                    assert!(!is_launched(&t, "j1"), "launched early in {order:?}");
                }
            }
            assert!(is_launched(&t, "j1"));

            assert!(eventually(|| t.executor.started().len() == 1).await);
            assert_eq!(
                t.executor.started()[0].parameters[0].values,
                vec!["a0".to_string(), "a1".to_string(), "a2".to_string()]
            );
        });
    }
}
