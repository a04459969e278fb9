//! BYOVD driver assessment.
//!
//! Cross-references a driver against the LOLDrivers list and the Windows 10
//! and Windows 11 driver block policies, and checks its imports for kernel
//! primitives that make it useful to an attacker. Scoring and the verdict
//! live in `litterbox-risk`; this module only produces the findings.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use litterbox_core::config::HolyGrailConfig;
use litterbox_core::driver::{ByovdAssessment, ByovdFindings};
use litterbox_core::target::{AnalysisTarget, PeInfo};

use crate::error::EngineError;

static POLICY_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bHash\s*=\s*"([0-9a-f]{32,128})""#).expect("valid policy hash regex")
});

static BARE_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[0-9a-f]{32}|[0-9a-f]{40}|[0-9a-f]{64})$").expect("valid bare hash regex")
});

#[derive(Debug, Deserialize)]
struct LolDriver {
    #[serde(rename = "KnownVulnerableSamples", default)]
    samples: Vec<LolSample>,
}

#[derive(Debug, Deserialize)]
struct LolSample {
    #[serde(rename = "MD5", default)]
    md5: Option<String>,
    #[serde(rename = "SHA1", default)]
    sha1: Option<String>,
    #[serde(rename = "SHA256", default)]
    sha256: Option<String>,
    #[serde(rename = "Authentihash", default)]
    authentihash: Option<Authentihash>,
}

#[derive(Debug, Deserialize)]
struct Authentihash {
    #[serde(rename = "MD5", default)]
    md5: Option<String>,
    #[serde(rename = "SHA1", default)]
    sha1: Option<String>,
    #[serde(rename = "SHA256", default)]
    sha256: Option<String>,
}

impl LolSample {
    fn hashes(self) -> impl Iterator<Item = String> {
        let image = self
            .authentihash
            .map(|a| [a.md5, a.sha1, a.sha256])
            .unwrap_or_default();
        [self.md5, self.sha1, self.sha256].into_iter().chain(image).flatten()
    }
}

/// Lowercased hashes from the three reference sources.
#[derive(Debug, Clone, Default)]
pub struct DriverReferences {
    loldrivers: HashSet<String>,
    win10_blocked: HashSet<String>,
    win11_blocked: HashSet<String>,
}

impl DriverReferences {
    /// Read the reference files named in `config`.
    pub async fn load(config: &HolyGrailConfig) -> Result<Self, EngineError> {
        let loldrivers = read(&config.loldrivers_path).await?;
        let loldrivers =
            parse_loldrivers(&loldrivers).map_err(|e| EngineError::References {
                path: config.loldrivers_path.clone(),
                reason: format!("invalid LOLDrivers JSON: {e}"),
            })?;
        let win10_blocked = parse_block_policy(&read(&config.win10_policy_path).await?);
        let win11_blocked = parse_block_policy(&read(&config.win11_policy_path).await?);

        info!(
            loldrivers = loldrivers.len(),
            win10 = win10_blocked.len(),
            win11 = win11_blocked.len(),
            "driver reference lists loaded"
        );
        Ok(Self {
            loldrivers,
            win10_blocked,
            win11_blocked,
        })
    }

    pub fn from_sets(
        loldrivers: HashSet<String>,
        win10_blocked: HashSet<String>,
        win11_blocked: HashSet<String>,
    ) -> Self {
        Self {
            loldrivers,
            win10_blocked,
            win11_blocked,
        }
    }
}

async fn read(path: &str) -> Result<String, EngineError> {
    tokio::fs::read_to_string(Path::new(path))
        .await
        .map_err(|e| EngineError::References {
            path: path.to_owned(),
            reason: e.to_string(),
        })
}

/// Every sample hash in a LOLDrivers JSON export, file hashes and
/// Authenticode image hashes alike.
pub fn parse_loldrivers(json: &str) -> Result<HashSet<String>, serde_json::Error> {
    let drivers: Vec<LolDriver> = serde_json::from_str(json)?;
    Ok(drivers
        .into_iter()
        .flat_map(|d| d.samples)
        .flat_map(LolSample::hashes)
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect())
}

/// Hashes from a driver block policy: `Hash="..."` attributes of a WDAC XML
/// policy, or one hex hash per line.
pub fn parse_block_policy(text: &str) -> HashSet<String> {
    let mut hashes: HashSet<String> = POLICY_HASH
        .captures_iter(text)
        .map(|c| c[1].to_ascii_lowercase())
        .collect();
    hashes.extend(
        text.lines()
            .map(str::trim)
            .filter(|line| BARE_HASH.is_match(line))
            .map(str::to_ascii_lowercase),
    );
    hashes
}

/// Findings for `target` against `references`.
///
/// A list entry matches on the file MD5 or SHA-256, or on the Authenticode
/// image hash, which block policies use for signed drivers.
pub fn findings(
    target: &AnalysisTarget,
    pe: &PeInfo,
    references: &DriverReferences,
    dangerous_imports: &[String],
) -> ByovdFindings {
    let hashes: Vec<String> = [&target.md5, &target.sha256, &pe.authentihash]
        .into_iter()
        .flatten()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    let listed = |set: &HashSet<String>| hashes.iter().any(|h| set.contains(h));

    let mut critical_imports: Vec<String> = Vec::new();
    for function in pe.imported_functions() {
        let dangerous = dangerous_imports
            .iter()
            .any(|d| d.eq_ignore_ascii_case(function));
        if dangerous && !critical_imports.iter().any(|c| c == function) {
            critical_imports.push(function.to_owned());
        }
    }

    let findings = ByovdFindings {
        is_loldriver: listed(&references.loldrivers),
        is_win10_blocked: listed(&references.win10_blocked),
        is_win11_blocked: listed(&references.win11_blocked),
        has_dangerous_imports: !critical_imports.is_empty(),
        critical_imports,
    };
    debug!(target_id = %target.id, ?findings, "driver findings");
    findings
}

/// Findings, score and verdict, plus the full import list for display.
pub fn assess(
    target: &AnalysisTarget,
    pe: &PeInfo,
    references: &DriverReferences,
    dangerous_imports: &[String],
) -> (ByovdAssessment, Vec<String>) {
    let assessment =
        litterbox_risk::assess_driver(findings(target, pe, references, dangerous_imports));
    let imports = pe.imported_functions().map(str::to_owned).collect();
    (assessment, imports)
}
