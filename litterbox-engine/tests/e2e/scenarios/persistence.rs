//! Storage behaviour seen through the orchestrator: records survive a
//! restart, config comes from `litterbox.toml`, and write failures reach the
//! caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use litterbox_core::error::{LitterboxError, PersistenceError};
use litterbox_core::record::TargetRecord;
use litterbox_core::types::{AnalysisType, JobStatus, TargetId};
use litterbox_engine::{AnalysisOptions, Orchestrator, OrchestratorBuilder};
use litterbox_store::{MemoryRepository, RecordRepository, StoreError};
use serial_test::serial;

use crate::helpers::config::{TestConfigBuilder, orchestrator};
use crate::helpers::wait_for_active_job;

#[tokio::test]
async fn results_survive_an_engine_restart() {
    let builder = TestConfigBuilder::new().tool("yara", "true");
    let config_path = builder.write_toml();
    let (_dir, config) = builder.build();

    let (id, job) = {
        let engine = orchestrator(config).await;
        let id = engine.upload("keep.exe", b"MZ keep").await.unwrap().target.id;
        let job = engine
            .analyze(&id, AnalysisType::Static, AnalysisOptions::default())
            .await
            .unwrap();
        (id, job)
    };

    let engine = Orchestrator::open(&config_path).await.unwrap();
    let record = engine.results(&id).await.unwrap();
    assert_eq!(record.jobs, vec![job]);
    assert!(record.static_analysis.is_some());

    let summary = engine.summary().await.unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].analyses, vec![AnalysisType::Static]);
}

#[tokio::test]
#[serial]
async fn open_applies_environment_overrides() {
    let builder = TestConfigBuilder::new();
    let config_path = builder.write_toml();

    unsafe { std::env::set_var("LITTERBOX_ANALYSIS_JOB_TIMEOUT_SECS", "42") };
    let opened = Orchestrator::open(&config_path).await;
    unsafe { std::env::remove_var("LITTERBOX_ANALYSIS_JOB_TIMEOUT_SECS") };

    let engine = opened.unwrap();
    assert_eq!(engine.config().analysis.job_timeout_secs, 42);
}

#[tokio::test]
#[serial]
async fn open_rejects_invalid_override() {
    let builder = TestConfigBuilder::new();
    let config_path = builder.write_toml();

    unsafe { std::env::set_var("LITTERBOX_FUZZY_BLOCK_SIZE", "0") };
    let opened = Orchestrator::open(&config_path).await;
    unsafe { std::env::remove_var("LITTERBOX_FUZZY_BLOCK_SIZE") };

    let err = opened.err().expect("block size 0 should be rejected");
    assert!(err.to_string().contains("block_size"), "{err}");
}

#[tokio::test]
async fn missing_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = Orchestrator::open(&dir.path().join("absent.toml"))
        .await
        .err()
        .expect("missing file should fail");
    assert!(err.to_string().contains("absent.toml"), "{err}");
}

/// Memory backend whose writes can be switched off mid-job.
#[derive(Clone, Default)]
struct FlakyRepository {
    inner: MemoryRepository,
    fail_writes: Arc<AtomicBool>,
}

impl RecordRepository for FlakyRepository {
    async fn get(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        self.inner.get(id).await
    }

    async fn put(&self, record: &TargetRecord) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                key: record.target.id.to_string(),
                reason: "disk full".to_owned(),
            });
        }
        self.inner.put(record).await
    }

    async fn delete(&self, id: &TargetId) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> Result<Vec<TargetRecord>, StoreError> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn failed_result_write_is_returned_to_the_caller() {
    // Given: a static job running over a backend that then starts failing
    let (_dir, config) = TestConfigBuilder::new().tool("yara", "sleep 1").build();
    let repo = FlakyRepository::default();
    let fail = Arc::clone(&repo.fail_writes);
    let engine = Arc::new(
        OrchestratorBuilder::new(config)
            .build_with(repo)
            .await
            .unwrap(),
    );
    let id = engine.upload("x.exe", b"MZ flaky").await.unwrap().target.id;

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
    fail.store(true, Ordering::SeqCst);

    // When
    let err = running.await.unwrap().unwrap_err();

    // Then: a persistence error, and nothing was reported as completed
    let err: LitterboxError = err.into();
    assert!(
        matches!(err, LitterboxError::Persistence(PersistenceError::Write { .. })),
        "unexpected error: {err}"
    );
    let record = engine.results(&id).await.unwrap();
    assert!(record.static_analysis.is_none());
    assert!(
        record.jobs.iter().all(|j| j.status != JobStatus::Completed),
        "no job may claim completion"
    );
}
