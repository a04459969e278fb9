//! Static analysis through the orchestrator: scanners run against the stored
//! artifact, results and risk land in the record.

use litterbox_core::types::{AnalysisType, JobStatus, ScannerStatus, TargetId};
use litterbox_engine::AnalysisOptions;

use crate::helpers::config::{TestConfigBuilder, orchestrator};

const MATCHING_YARA: &str = r#"printf 'Evil_Loader [severity="critical",score=90] %s\n0x40:$a: VirtualAlloc\n' "$0""#;

#[tokio::test]
async fn static_job_completes_and_scores_the_target() {
    // Given: a matching yara rule and a clean stringnalyzer
    let (_dir, config) = TestConfigBuilder::new()
        .tool("yara", MATCHING_YARA)
        .tool("stringnalyzer", "true")
        .build();
    let engine = orchestrator(config).await;
    let target = engine.upload("sample.exe", b"MZ not really a pe").await.unwrap().target;

    // When
    let job = engine
        .analyze(&target.id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap();

    // Then
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.message);
    assert!(job.finished_at.is_some(), "terminal job should carry finished_at");

    let record = engine.results(&target.id).await.unwrap();
    let section = record.static_analysis.expect("static section should be written");
    assert_eq!(section.job_id, job.id);
    assert_eq!(section.results["yara"].status, ScannerStatus::Success);
    assert_eq!(section.results["yara"].detections.len(), 1);
    assert_eq!(section.results["stringnalyzer"].status, ScannerStatus::Success);
    assert_eq!(section.results["checkplz"].status, ScannerStatus::Skipped);
    assert!(
        section.risk_assessment.score > 0,
        "a critical yara match should raise the score"
    );
}

#[tokio::test]
async fn failing_scanner_makes_job_partial_without_hiding_others() {
    let (_dir, config) = TestConfigBuilder::new()
        .tool("yara", MATCHING_YARA)
        .tool("stringnalyzer", "echo broken >&2; exit 3")
        .build();
    let engine = orchestrator(config).await;
    let target = engine.upload("sample.exe", b"MZ partial").await.unwrap().target;

    let job = engine
        .analyze(&target.id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Partial);
    assert!(
        job.message.as_deref().unwrap_or_default().contains("stringnalyzer"),
        "message should name the failed scanner: {:?}",
        job.message
    );
    let section = engine.results(&target.id).await.unwrap().static_analysis.unwrap();
    assert_eq!(section.results["stringnalyzer"].status, ScannerStatus::Error);
    assert_eq!(section.results["yara"].detections.len(), 1);
}

#[tokio::test]
async fn scanner_timeout_is_recorded_per_scanner() {
    let (_dir, config) = TestConfigBuilder::new()
        .tool_with_timeout("yara", "sleep 5", 1)
        .tool("stringnalyzer", "true")
        .build();
    let engine = orchestrator(config).await;
    let target = engine.upload("slow.exe", b"MZ slow").await.unwrap().target;

    let job = engine
        .analyze(&target.id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Partial);
    let section = engine.results(&target.id).await.unwrap().static_analysis.unwrap();
    assert_eq!(section.results["yara"].status, ScannerStatus::Timeout);
}

#[tokio::test]
async fn no_enabled_scanner_completes_with_nothing_to_report() {
    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator(config).await;
    let target = engine.upload("quiet.exe", b"MZ quiet").await.unwrap().target;

    let job = engine
        .analyze(&target.id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    let section = engine.results(&target.id).await.unwrap().static_analysis.unwrap();
    assert!(
        section
            .results
            .values()
            .all(|r| r.status == ScannerStatus::Skipped),
        "every static scanner should be skipped"
    );
}

#[tokio::test]
async fn rerun_replaces_section_and_keeps_job_history() {
    let (_dir, config) = TestConfigBuilder::new().tool("yara", "true").build();
    let engine = orchestrator(config).await;
    let target = engine.upload("twice.exe", b"MZ twice").await.unwrap().target;

    let first = engine
        .analyze(&target.id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap();
    let second = engine
        .analyze(&target.id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap();

    let record = engine.results(&target.id).await.unwrap();
    assert_eq!(record.jobs.len(), 2);
    assert_ne!(first.id, second.id);
    assert_eq!(record.static_analysis.unwrap().job_id, second.id);
}

#[tokio::test]
async fn static_analysis_of_a_process_is_unsupported() {
    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator(config).await;
    let target = engine
        .register_process(std::process::id())
        .await
        .unwrap()
        .target;

    let err = engine
        .analyze(&target.id, AnalysisType::Static, AnalysisOptions::default())
        .await
        .unwrap_err();

    assert!(
        err.to_string().contains("needs a file target"),
        "unexpected error: {err}"
    );
    assert!(engine.results(&target.id).await.unwrap().jobs.is_empty());
}

#[tokio::test]
async fn blender_is_rejected_before_any_job_is_recorded() {
    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator(config).await;
    let target = engine.upload("a.exe", b"MZ blender").await.unwrap().target;

    let err = engine
        .analyze(&target.id, AnalysisType::Blender, AnalysisOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("not supported"), "{err}");
    assert!(engine.results(&target.id).await.unwrap().jobs.is_empty());
}

#[tokio::test]
async fn unknown_target_is_not_found() {
    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator(config).await;

    let err = engine
        .analyze(
            &TargetId::new("ffffffffffffffffffffffffffffffff"),
            AnalysisType::Static,
            AnalysisOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "unexpected error: {err}");
}
