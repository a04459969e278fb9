//! At most one job per (target, type), one dynamic run per host, and
//! cancellation of running jobs.

use std::sync::Arc;

use litterbox_core::error::ConflictError;
use litterbox_core::types::{AnalysisType, JobStatus};
use litterbox_engine::{AnalysisOptions, EngineError, ExecutionSlot};

use crate::helpers::config::{TestConfigBuilder, orchestrator, orchestrator_with_slot};
use crate::helpers::wait_for_active_job;

#[tokio::test]
async fn second_job_of_same_type_is_rejected_while_first_runs() {
    // Given: a static job blocked in a slow scanner
    let (_dir, config) = TestConfigBuilder::new().tool("yara", "sleep 2").build();
    let engine = Arc::new(orchestrator(config).await);
    let id = engine.upload("busy.exe", b"MZ busy").await.unwrap().target.id;

    let first = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        tokio::spawn(async move {
            engine
                .analyze(&id, AnalysisType::Static, AnalysisOptions::default())
                .await
        })
    };
    wait_for_active_job(&engine, &id).await;

    // When: the same analysis is requested again
    let err = engine
        .analyze(&id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap_err();

    // Then: conflict, and the first job still finishes normally
    assert!(err.is_conflict(), "expected conflict, got {err}");
    let job = first.await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(engine.results(&id).await.unwrap().jobs.len(), 1);
}

#[tokio::test]
async fn different_types_on_same_target_do_not_conflict() {
    let (_dir, config) = TestConfigBuilder::new().tool("yara", "sleep 1").build();
    let engine = Arc::new(orchestrator(config).await);
    let id = engine.upload("both.exe", b"MZ both").await.unwrap().target.id;

    let first = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        tokio::spawn(async move {
            engine
                .analyze(&id, AnalysisType::Static, AnalysisOptions::default())
                .await
        })
    };
    wait_for_active_job(&engine, &id).await;

    let fuzzy = engine
        .analyze(&id, AnalysisType::Fuzzy, AnalysisOptions::default())
        .await
        .unwrap();

    // No fuzzy database exists, so the job itself fails, but it was accepted.
    assert_eq!(fuzzy.status, JobStatus::Failed);
    assert_eq!(first.await.unwrap().unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn busy_execution_slot_rejects_dynamic_run_without_recording_a_job() {
    // Given: another holder owns the host's execution slot
    let slot = ExecutionSlot::new();
    let _held = slot.try_acquire().unwrap();
    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator_with_slot(config, slot.clone()).await;
    let id = engine.upload("payload.sh", b"#!/bin/sh\nexit 0\n").await.unwrap().target.id;

    // When
    let err = engine
        .analyze(&id, AnalysisType::Dynamic, AnalysisOptions::default())
        .await
        .unwrap_err();

    // Then
    assert!(
        matches!(err, EngineError::Conflict(ConflictError::ExecutionSlotBusy)),
        "expected slot busy, got {err}"
    );
    assert!(engine.results(&id).await.unwrap().jobs.is_empty());
    assert!(slot.is_busy());
}

#[tokio::test]
async fn cleanup_is_refused_while_the_slot_is_held() {
    let slot = ExecutionSlot::new();
    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator_with_slot(config, slot.clone()).await;
    engine.upload("keep.exe", b"MZ keep").await.unwrap();

    let held = slot.try_acquire().unwrap();
    let err = engine.cleanup().await.unwrap_err();
    assert!(err.is_conflict(), "{err}");
    assert_eq!(engine.list().await.unwrap().len(), 1, "nothing should be deleted");

    drop(held);
    assert_eq!(engine.cleanup().await.unwrap(), 1);
    assert!(engine.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_is_refused_while_a_job_runs() {
    let (_dir, config) = TestConfigBuilder::new().tool("yara", "sleep 1").build();
    let engine = Arc::new(orchestrator(config).await);
    let id = engine.upload("inuse.exe", b"MZ in use").await.unwrap().target.id;

    let running = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        tokio::spawn(async move {
            engine
                .analyze(&id, AnalysisType::Static, AnalysisOptions::default())
                .await
        })
    };
    wait_for_active_job(&engine, &id).await;

    let err = engine.delete(&id).await.unwrap_err();
    assert!(err.is_conflict(), "{err}");

    running.await.unwrap().unwrap();
    assert!(engine.delete(&id).await.unwrap());
    assert!(!engine.delete(&id).await.unwrap(), "second delete is a no-op");
    assert!(engine.results(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn cancelled_job_keeps_previous_results() {
    // Given: a completed static job, then a second one that hangs
    let builder = TestConfigBuilder::new();
    let marker = builder.data_dir().join("hang");
    let (_dir, config) = builder
        .tool("yara", &format!("[ -f '{}' ] && sleep 30; true", marker.display()))
        .build();
    let engine = Arc::new(orchestrator(config).await);
    let id = engine.upload("cancel.exe", b"MZ cancel").await.unwrap().target.id;
    let first = engine
        .analyze(&id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap();
    std::fs::write(&marker, b"").unwrap();

    let second = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        tokio::spawn(async move {
            engine
                .analyze(&id, AnalysisType::Static, AnalysisOptions::default())
                .await
        })
    };
    wait_for_active_job(&engine, &id).await;

    // When
    assert!(engine.cancel(&id, AnalysisType::Static).await);
    let job = second.await.unwrap().unwrap();

    // Then: cancelled, and the static section still belongs to the first job
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.message.as_deref(), Some("cancelled by request"));
    let record = engine.results(&id).await.unwrap();
    assert_eq!(record.static_analysis.unwrap().job_id, first.id);
    assert!(record.active_job().is_none());
    assert!(!engine.cancel(&id, AnalysisType::Static).await, "nothing left to cancel");
}

#[tokio::test]
async fn job_timeout_fails_the_job_but_keeps_partial_results() {
    let (_dir, config) = TestConfigBuilder::new()
        .tool("yara", "sleep 10")
        .tool("stringnalyzer", "true")
        .job_timeout(1)
        .build();
    let engine = orchestrator(config).await;
    let id = engine.upload("long.exe", b"MZ long").await.unwrap().target.id;

    let job = engine
        .analyze(&id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(
        job.message.as_deref().unwrap_or_default().contains("time limit"),
        "{:?}",
        job.message
    );
    let section = engine.results(&id).await.unwrap().static_analysis;
    assert!(section.is_some(), "partial results should be stored");
}
