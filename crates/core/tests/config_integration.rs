//! litterbox.toml integration tests
//!
//! - litterbox.toml.example parsing
//! - partial config loading
//! - environment override precedence
//! - file loading errors

use litterbox_core::config::LitterboxConfig;
use litterbox_core::error::{ConfigError, LitterboxError};
use serial_test::serial;

// =============================================================================
// litterbox.toml.example
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../litterbox.toml.example");
    let config = LitterboxConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.general.data_dir, "/var/lib/litterbox");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../litterbox.toml.example");
    let config = LitterboxConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_has_expected_scanners() {
    let content = include_str!("../../../litterbox.toml.example");
    let config = LitterboxConfig::parse(content).expect("should parse");

    assert!(config.scanners.yara.enabled);
    assert!(config.scanners.yara.command.contains("{rules_path}"));
    assert!(config.scanners.pe_sieve.command.contains("{pid}"));
    assert!(!config.scanners.rededr.enabled);
    assert_eq!(config.scanners.rededr.timeout_secs, 600);
    assert_eq!(config.analysis.process.max_output_bytes, 65536);
}

#[test]
fn example_config_resolves_relative_storage() {
    let content = include_str!("../../../litterbox.toml.example");
    let config = LitterboxConfig::parse(content).expect("should parse");

    assert_eq!(
        config.upload_dir(),
        std::path::PathBuf::from("/var/lib/litterbox/uploads")
    );
    assert_eq!(
        config.fuzzy_db_path(),
        std::path::PathBuf::from("/var/lib/litterbox/fuzzy_db.json")
    );
}

// =============================================================================
// partial config
// =============================================================================

#[test]
fn only_general_section_uses_defaults_elsewhere() {
    let config = LitterboxConfig::parse("[general]\nlog_level = \"warn\"\n").expect("should parse");
    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.analysis.max_parallel_scanners, 4);
    assert!(config.holygrail.enabled);
    config.validate().expect("defaults should validate");
}

#[test]
fn wrong_type_is_a_parse_error() {
    let err = LitterboxConfig::parse("[analysis]\nmax_parallel_scanners = \"many\"\n")
        .expect_err("string for usize should fail");
    assert!(matches!(
        err,
        LitterboxError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// file loading
// =============================================================================

#[tokio::test]
async fn from_file_missing_path_is_file_not_found() {
    let err = LitterboxConfig::from_file("/nonexistent/litterbox.toml")
        .await
        .expect_err("missing file should fail");
    assert!(matches!(
        err,
        LitterboxError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn from_file_rejects_invalid_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("litterbox.toml");
    std::fs::write(&path, "[fuzzy]\nblock_size = 0\n").expect("write config");

    let err = LitterboxConfig::from_file(&path)
        .await
        .expect_err("zero block size should fail validation");
    assert!(err.to_string().contains("fuzzy.block_size"));
}

#[tokio::test]
#[serial]
async fn load_applies_env_over_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("litterbox.toml");
    std::fs::write(&path, "[general]\nlog_level = \"info\"\n").expect("write config");

    // SAFETY: serialized with other env-mutating tests.
    unsafe {
        std::env::set_var("LITTERBOX_GENERAL_LOG_LEVEL", "debug");
        std::env::set_var("LITTERBOX_ANALYSIS_MAX_PARALLEL_SCANNERS", "8");
    }
    let result = LitterboxConfig::load(&path).await;
    unsafe {
        std::env::remove_var("LITTERBOX_GENERAL_LOG_LEVEL");
        std::env::remove_var("LITTERBOX_ANALYSIS_MAX_PARALLEL_SCANNERS");
    }

    let config = result.expect("load should succeed");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.analysis.max_parallel_scanners, 8);
}

#[tokio::test]
#[serial]
async fn load_validates_after_env_overrides() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("litterbox.toml");
    std::fs::write(&path, "").expect("write config");

    // SAFETY: serialized with other env-mutating tests.
    unsafe { std::env::set_var("LITTERBOX_GENERAL_LOG_FORMAT", "xml") };
    let result = LitterboxConfig::load(&path).await;
    unsafe { std::env::remove_var("LITTERBOX_GENERAL_LOG_FORMAT") };

    let err = result.expect_err("invalid format from env should fail");
    assert!(err.to_string().contains("log_format"));
}
