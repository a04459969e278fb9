//! Engine health as seen after startup and after the fuzzy database exists.

use litterbox_core::types::HealthStatus;

use crate::helpers::config::{TestConfigBuilder, orchestrator};

#[tokio::test]
async fn fresh_engine_is_degraded_until_fuzzy_db_is_built() {
    // Given: storage created by the engine, no fuzzy database yet
    let builder = TestConfigBuilder::new().tool("yara", "true");
    let corpus = builder.data_dir().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    std::fs::write(corpus.join("ref.bin"), b"reference bytes").unwrap();
    let (_dir, config) = builder.build();
    let engine = orchestrator(config).await;

    // When / Then
    let report = engine.health();
    match &report.status {
        HealthStatus::Degraded(reason) => assert!(reason.contains("fuzzy"), "{reason}"),
        other => panic!("expected degraded, got {other:?}"),
    }
    let storage = report.components.iter().find(|c| c.name == "storage").unwrap();
    assert_eq!(storage.status, HealthStatus::Healthy);

    engine.build_fuzzy_db(&corpus).await.unwrap();
    assert_eq!(engine.health().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn missing_enabled_tool_is_unhealthy() {
    let (_dir, mut config) = TestConfigBuilder::new().build();
    config.scanners.moneta.enabled = true;
    config.scanners.moneta.tool_path = "/nonexistent/moneta64.exe".to_owned();
    let engine = orchestrator(config).await;

    let report = engine.health();

    assert!(report.status.is_unhealthy());
    let moneta = report.components.iter().find(|c| c.name == "moneta").unwrap();
    assert!(moneta.enabled);
    assert!(matches!(&moneta.status, HealthStatus::Unhealthy(r) if r.contains("moneta64.exe")));
}

#[tokio::test]
async fn disabled_components_do_not_count() {
    let (_dir, mut config) = TestConfigBuilder::new().build();
    config.scanners.pe_sieve.tool_path = "/nonexistent/pe-sieve.exe".to_owned();
    let engine = orchestrator(config).await;

    let report = engine.health();

    assert!(!report.status.is_unhealthy(), "disabled tool must not fail health");
    let holygrail = report.components.iter().find(|c| c.name == "holygrail").unwrap();
    assert!(!holygrail.enabled);
}
