//! Tool and reference-data availability.
//!
//! Produces an [`EngineHealth`] report with one entry per enabled scanner
//! tool plus the HolyGrail reference files, the storage directories and the
//! fuzzy database. The overall status is the worst status among enabled
//! components.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use std::path::{Path, PathBuf};

use serde::Serialize;

use litterbox_core::config::LitterboxConfig;
use litterbox_core::types::HealthStatus;

/// Aggregated health report for the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    /// Worst status among enabled components.
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

/// Health of one tool or data file.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Config key, e.g. "yara", "pe_sieve", "holygrail".
    pub name: String,
    pub enabled: bool,
    pub status: HealthStatus,
}

impl ComponentHealth {
    fn new(name: impl Into<String>, enabled: bool, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            enabled,
            status,
        }
    }
}

/// Aggregate component statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
/// Only considers enabled components.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for component in components.iter().filter(|c| c.enabled) {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", component.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                if !worst.is_unhealthy() {
                    reasons.clear();
                }
                reasons.push(format!("{}: {}", component.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}

/// Check everything `config` points at on disk.
///
/// A missing scanner tool or reference file is Unhealthy. A missing fuzzy
/// database is only Degraded since it is built on demand.
pub fn check(config: &LitterboxConfig) -> EngineHealth {
    let mut components = Vec::new();

    components.push(ComponentHealth::new(
        "storage",
        true,
        directories_status(&[config.upload_dir(), config.result_dir()]),
    ));

    for (name, tool) in config.scanners.iter() {
        let status = if tool_available(&tool.tool_path) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy(format!("tool not found: {}", tool.tool_path))
        };
        components.push(ComponentHealth::new(name, tool.enabled, status));
    }

    let holygrail = &config.holygrail;
    components.push(ComponentHealth::new(
        "holygrail",
        holygrail.enabled,
        files_status(&[
            &holygrail.loldrivers_path,
            &holygrail.win10_policy_path,
            &holygrail.win11_policy_path,
        ]),
    ));

    let db_path = config.fuzzy_db_path();
    let fuzzy_status = if db_path.is_file() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded(format!("database not built: {}", db_path.display()))
    };
    components.push(ComponentHealth::new("fuzzy", true, fuzzy_status));

    EngineHealth {
        status: aggregate_status(&components),
        components,
    }
}

fn directories_status(dirs: &[PathBuf]) -> HealthStatus {
    let missing: Vec<String> = dirs
        .iter()
        .filter(|d| !d.is_dir())
        .map(|d| d.display().to_string())
        .collect();
    if missing.is_empty() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy(format!("missing directory: {}", missing.join(", ")))
    }
}

fn files_status(paths: &[&String]) -> HealthStatus {
    let missing: Vec<&str> = paths
        .iter()
        .filter(|p| !Path::new(p.as_str()).is_file())
        .map(|p| p.as_str())
        .collect();
    if missing.is_empty() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy(format!("missing reference file: {}", missing.join(", ")))
    }
}

/// A path to an existing file, or a bare program name found on `PATH`.
fn tool_available(tool_path: &str) -> bool {
    if tool_path.is_empty() {
        return false;
    }
    let path = Path::new(tool_path);
    if path.is_file() {
        return true;
    }
    if path.components().count() > 1 {
        return false;
    }
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(tool_path).is_file())
    })
}
