//! Dynamic runs through the orchestrator: a launched payload and an attached
//! process.

use std::process::Command;

use litterbox_core::types::{AnalysisType, JobStatus, ScannerStatus};
use litterbox_engine::AnalysisOptions;
use litterbox_scanners::is_process_alive;

use crate::helpers::config::{TestConfigBuilder, orchestrator};
use crate::helpers::fixtures::make_executable;

const LIVE_YARA: &str = r#"printf 'Beacon_Config [severity="high"] %s\n' "$0""#;

#[tokio::test]
async fn payload_exiting_early_skips_memory_scanners() {
    // Given: a payload that exits at once and a memory scanner
    let (_dir, config) = TestConfigBuilder::new()
        .tool("yara_process", LIVE_YARA)
        .init_wait(2)
        .build();
    let engine = orchestrator(config).await;
    let target = engine
        .upload("quick.sh", b"#!/bin/sh\nexit 0\n")
        .await
        .unwrap()
        .target;
    make_executable(&engine.registry().artifact_path(&target).unwrap());

    // When
    let job = engine
        .analyze(&target.id, AnalysisType::Dynamic, AnalysisOptions::default())
        .await
        .unwrap();

    // Then
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.message);
    assert!(
        job.message
            .as_deref()
            .unwrap_or_default()
            .starts_with("Process terminated after"),
        "{:?}",
        job.message
    );
    let dynamic = engine.results(&target.id).await.unwrap().dynamic.unwrap();
    assert!(dynamic.metadata.early_termination);
    assert!(!dynamic.metadata.attached);
    let yara = &dynamic.results["yara"];
    assert_eq!(yara.status, ScannerStatus::Skipped);
    assert_eq!(yara.message.as_deref(), Some("process terminated before scanning"));
}

#[tokio::test]
async fn running_payload_is_scanned_and_then_terminated() {
    let (_dir, config) = TestConfigBuilder::new()
        .tool("yara_process", LIVE_YARA)
        .build();
    let engine = orchestrator(config).await;
    let target = engine
        .upload("stay.sh", b"#!/bin/sh\necho started\nsleep 30\n")
        .await
        .unwrap()
        .target;
    make_executable(&engine.registry().artifact_path(&target).unwrap());

    let job = engine
        .analyze(
            &target.id,
            AnalysisType::Dynamic,
            AnalysisOptions {
                cmd_args: vec!["--quiet".to_owned()],
            },
        )
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.message);
    let dynamic = engine.results(&target.id).await.unwrap().dynamic.unwrap();
    assert_eq!(dynamic.results["yara"].status, ScannerStatus::Success);
    assert_eq!(dynamic.results["yara"].detections.len(), 1);
    assert_eq!(dynamic.metadata.cmd_args, vec!["--quiet".to_owned()]);

    let pid = dynamic.metadata.pid.expect("payload pid recorded");
    assert!(!is_process_alive(pid), "payload must be terminated after the run");
    let output = dynamic.process_output.expect("payload output captured");
    assert!(output.stdout.contains("started"));
    assert!(dynamic.risk_assessment.score > 0);
}

#[tokio::test]
async fn attached_process_is_scanned_and_left_running() {
    // Given: an already running process registered by pid
    let mut other = Command::new("sleep").arg("30").spawn().unwrap();
    let pid = other.id();
    let (_dir, config) = TestConfigBuilder::new()
        .tool("yara_process", LIVE_YARA)
        .build();
    let engine = orchestrator(config).await;
    let registration = engine.register_process(pid).await.unwrap();
    assert!(registration.created);
    let again = engine.register_process(pid).await.unwrap();
    assert!(!again.created, "same pid should map to the same target");
    assert_eq!(again.target.id, registration.target.id);

    // When
    let job = engine
        .analyze(
            &registration.target.id,
            AnalysisType::Dynamic,
            AnalysisOptions::default(),
        )
        .await
        .unwrap();

    // Then
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.message);
    let dynamic = engine
        .results(&registration.target.id)
        .await
        .unwrap()
        .dynamic
        .unwrap();
    assert!(dynamic.metadata.attached);
    assert_eq!(dynamic.metadata.pid, Some(pid));
    assert!(dynamic.process_output.is_none(), "attached runs capture no output");
    assert!(is_process_alive(pid), "attached process must survive");

    other.kill().unwrap();
    other.wait().unwrap();
}

#[tokio::test]
async fn dead_pid_cannot_be_registered() {
    let mut gone = Command::new("true").spawn().unwrap();
    let pid = gone.id();
    gone.wait().unwrap();

    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator(config).await;

    let err = engine.register_process(pid).await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(engine.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn slot_is_released_after_a_dynamic_run() {
    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator(config).await;
    let target = engine
        .upload("short.sh", b"#!/bin/sh\nexit 0\n")
        .await
        .unwrap()
        .target;
    make_executable(&engine.registry().artifact_path(&target).unwrap());

    engine
        .analyze(&target.id, AnalysisType::Dynamic, AnalysisOptions::default())
        .await
        .unwrap();

    assert!(!engine.execution_slot().is_busy());
    let second = engine
        .analyze(&target.id, AnalysisType::Dynamic, AnalysisOptions::default())
        .await
        .unwrap();
    assert_eq!(second.status, JobStatus::Completed);
}
