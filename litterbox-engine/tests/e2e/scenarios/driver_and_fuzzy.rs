//! HolyGrail driver assessment and fuzzy similarity against a reference
//! corpus.

use litterbox_core::driver::DriverVerdict;
use litterbox_core::types::{AnalysisType, JobStatus};
use litterbox_engine::AnalysisOptions;

use crate::helpers::config::{TestConfigBuilder, orchestrator};
use crate::helpers::fixtures::{driver_image, sign_image, unsigned_authentihash};

const EMPTY_POLICY: &str = "<SiPolicy></SiPolicy>";

#[tokio::test]
async fn listed_driver_is_known_vulnerable() {
    // Given: the driver's sha256 appears in the LOLDrivers list
    let image = driver_image(0xAB);
    let sha256 = {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(&image))
    };
    let loldrivers = format!(
        r#"[{{"Id":"x","KnownVulnerableSamples":[{{"SHA256":"{}"}}]}}]"#,
        sha256.to_uppercase()
    );
    let (_dir, config) = TestConfigBuilder::new()
        .holygrail(&loldrivers, EMPTY_POLICY, "")
        .build();
    let engine = orchestrator(config).await;
    let target = engine.upload("vuln.sys", &image).await.unwrap().target;

    // When
    let job = engine
        .analyze(&target.id, AnalysisType::HolyGrail, AnalysisOptions::default())
        .await
        .unwrap();

    // Then
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.message);
    let section = engine.results(&target.id).await.unwrap().holygrail.unwrap();
    assert!(section.assessment.byovd_findings.is_loldriver);
    assert!(!section.assessment.byovd_findings.is_win10_blocked);
    assert_eq!(section.assessment.verdict, DriverVerdict::KnownVulnerableDriver);
    assert!(section.imports.is_empty());
}

#[tokio::test]
async fn blocked_driver_is_flagged_from_policy_hash() {
    let image = driver_image(0xCD);
    let md5 = hex::encode(md5::compute(&image).0);
    let policy = format!(r#"<SiPolicy><Deny ID="ID_DENY_X" Hash="{md5}" /></SiPolicy>"#);
    let (_dir, config) = TestConfigBuilder::new()
        .holygrail("[]", &policy, "")
        .build();
    let engine = orchestrator(config).await;
    let target = engine.upload("blocked.sys", &image).await.unwrap().target;

    engine
        .analyze(&target.id, AnalysisType::HolyGrail, AnalysisOptions::default())
        .await
        .unwrap();

    let section = engine.results(&target.id).await.unwrap().holygrail.unwrap();
    assert!(section.assessment.byovd_findings.is_win10_blocked);
    assert_eq!(section.assessment.verdict, DriverVerdict::BlockedDriver);
}

#[tokio::test]
async fn signed_driver_is_blocked_by_authenticode_hash() {
    // Given: a policy listing the image hash, and a signed copy of the driver
    let unsigned = driver_image(0xEF);
    let signed = sign_image(&unsigned, &[0x30; 64], 0x0001_F00D);
    let policy = format!(
        r#"<SiPolicy><Deny ID="ID_DENY_SIGNED" Hash="{}" /></SiPolicy>"#,
        unsigned_authentihash(&unsigned).to_uppercase()
    );
    let (_dir, config) = TestConfigBuilder::new()
        .holygrail("[]", &policy, &policy)
        .build();
    let engine = orchestrator(config).await;
    let target = engine.upload("signed.sys", &signed).await.unwrap().target;
    assert_ne!(
        target.md5.as_deref(),
        Some(hex::encode(md5::compute(&unsigned).0).as_str()),
        "signing should change the file hash"
    );

    // When
    let job = engine
        .analyze(&target.id, AnalysisType::HolyGrail, AnalysisOptions::default())
        .await
        .unwrap();

    // Then
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.message);
    let section = engine.results(&target.id).await.unwrap().holygrail.unwrap();
    assert!(
        section.assessment.byovd_findings.is_win10_blocked,
        "should match the policy on the Authenticode hash"
    );
    assert!(section.assessment.byovd_findings.is_win11_blocked);
    assert_eq!(section.assessment.verdict, DriverVerdict::BlockedDriver);
}

#[tokio::test]
async fn holygrail_rejects_non_drivers() {
    let (_dir, config) = TestConfigBuilder::new()
        .holygrail("[]", EMPTY_POLICY, "")
        .build();
    let engine = orchestrator(config).await;
    let target = engine.upload("doc.pdf", b"%PDF-1.7 nope").await.unwrap().target;

    let err = engine
        .analyze(&target.id, AnalysisType::HolyGrail, AnalysisOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("kernel driver"), "{err}");
    assert!(engine.results(&target.id).await.unwrap().jobs.is_empty());
}

#[tokio::test]
async fn holygrail_disabled_is_unsupported() {
    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator(config).await;
    let target = engine.upload("d.sys", &driver_image(1)).await.unwrap().target;

    let err = engine
        .analyze(&target.id, AnalysisType::HolyGrail, AnalysisOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("disabled"), "{err}");
}

#[tokio::test]
async fn fuzzy_finds_identical_reference() {
    // Given: a reference corpus containing the sample itself
    let builder = TestConfigBuilder::new().fuzzy_block_size(64);
    let corpus = builder.data_dir().join("corpus");
    std::fs::create_dir_all(corpus.join("family")).unwrap();
    let sample: Vec<u8> = (0..=255u8).cycle().take(640).collect();
    std::fs::write(corpus.join("family").join("known.bin"), &sample).unwrap();
    std::fs::write(corpus.join("unrelated.bin"), vec![0x11u8; 640]).unwrap();
    let (_dir, config) = builder.build();
    let engine = orchestrator(config).await;

    let db = engine.build_fuzzy_db(&corpus).await.unwrap();
    assert_eq!(db.references.len(), 2);
    let target = engine.upload("sample.bin", &sample).await.unwrap().target;

    // When
    let job = engine
        .analyze(&target.id, AnalysisType::Fuzzy, AnalysisOptions::default())
        .await
        .unwrap();

    // Then: only the identical reference clears the default threshold
    assert_eq!(job.status, JobStatus::Completed);
    let section = engine.results(&target.id).await.unwrap().fuzzy.unwrap();
    assert_eq!(section.matches.len(), 1);
    assert_eq!(section.matches[0].reference, "family/known.bin");
    assert_eq!(section.matches[0].similarity, 100.0);
    assert_eq!(section.matches[0].matching_blocks, section.matches[0].total_blocks);
}

#[tokio::test]
async fn fuzzy_without_database_fails_the_job() {
    let (_dir, config) = TestConfigBuilder::new().build();
    let engine = orchestrator(config).await;
    let target = engine.upload("a.bin", b"some bytes").await.unwrap().target;

    let job = engine
        .analyze(&target.id, AnalysisType::Fuzzy, AnalysisOptions::default())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(
        job.message.as_deref().unwrap_or_default().contains("fuzzy-db build"),
        "{:?}",
        job.message
    );
    assert!(engine.results(&target.id).await.unwrap().fuzzy.is_none());
}
