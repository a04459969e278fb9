//! General risk assessment for files and processes.
//!
//! # Composition
//!
//! | profile | PE metadata | static | dynamic |
//! |---------|-------------|--------|---------|
//! | file    | 0.10        | 0.50   | 0.40    |
//! | process | -           | -      | 1.00    |
//!
//! Each part is scored on its own scale and added with its weight. A part
//! that did not run adds nothing; the remaining weights are not rescaled.
//! The sum is then normalized per profile, clamped to `0..=100` and rounded.

use std::collections::BTreeMap;

use litterbox_core::findings::{
    CheckPlzFindings, HsbFindings, MonetaCounters, PatriotFindings, PeSieveFindings,
    RedEdrFindings, ScanFindings, YaraFindings,
};
use litterbox_core::target::{AnalysisTarget, PeInfo};
use litterbox_core::types::{RiskAssessment, ScannerResult, Severity, TargetKind};

/// Scanner results of one job, keyed by scanner name.
pub type ScanResults = BTreeMap<String, ScannerResult>;

/// Weighting and normalization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskProfile {
    /// Uploaded files and drivers.
    File,
    /// Live processes attached by pid.
    Process,
}

impl RiskProfile {
    pub fn for_kind(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Process => Self::Process,
            TargetKind::File | TargetKind::Driver => Self::File,
        }
    }

    fn is_file(self) -> bool {
        self == Self::File
    }
}

const PE_WEIGHT: f64 = 0.10;
const STATIC_WEIGHT: f64 = 0.50;
const FILE_DYNAMIC_WEIGHT: f64 = 0.40;
const PROCESS_DYNAMIC_WEIGHT: f64 = 1.0;

const CRITICAL_PE_IMPORTS: [&str; 5] = [
    "createremotethread",
    "virtualallocex",
    "writeprocessmemory",
    "ntmapviewofsection",
    "zwmapviewofsection",
];

const HIGH_RISK_PE_IMPORTS: [&str; 5] = [
    "loadlibrarya",
    "loadlibraryw",
    "getprocaddress",
    "openprocess",
    "virtualallocexnuma",
];

/// Assess a target from its metadata and whichever result sets exist.
pub fn assess(
    target: &AnalysisTarget,
    static_results: Option<&ScanResults>,
    dynamic_results: Option<&ScanResults>,
) -> RiskAssessment {
    let profile = RiskProfile::for_kind(target.kind);
    let static_results = static_results.filter(|r| !r.is_empty());
    let dynamic_results = dynamic_results.filter(|r| !r.is_empty());

    let mut score = 0.0;
    let mut factors = Vec::new();

    if profile.is_file() {
        if let Some(pe) = &target.pe_info {
            let (pe_score, pe_factors) = pe_risk(pe);
            factors.extend(pe_factors);
            score += pe_score * PE_WEIGHT;
        }
        if let Some(results) = static_results {
            let (static_score, static_factors) = static_risk(results, target.entropy);
            factors.extend(static_factors.into_iter().map(|f| format!("Static: {f}")));
            score += static_score * STATIC_WEIGHT;
        }
    }

    if let Some(results) = dynamic_results {
        let (dynamic_score, dynamic_factors) = dynamic_risk(results, profile);
        factors.extend(dynamic_factors.into_iter().map(|f| format!("Dynamic: {f}")));
        let weight = if profile.is_file() {
            FILE_DYNAMIC_WEIGHT
        } else {
            PROCESS_DYNAMIC_WEIGHT
        };
        score += dynamic_score * weight;
    }

    let score = normalize(score, profile, dynamic_results, &factors);
    let score = score.clamp(0.0, 100.0).round() as u8;
    tracing::debug!(target_id = %target.id, score, factors = factors.len(), "risk assessed");
    RiskAssessment::new(score, factors)
}

fn normalize(
    score: f64,
    profile: RiskProfile,
    dynamic_results: Option<&ScanResults>,
    factors: &[String],
) -> f64 {
    match profile {
        RiskProfile::File => {
            let base = score.clamp(0.0, 100.0);
            if base > 75.0 {
                (base * 1.15).min(100.0)
            } else {
                score
            }
        }
        RiskProfile::Process => {
            let mut score = score;
            let yara_matches = dynamic_results
                .and_then(yara_findings)
                .map_or(0, |y| y.matches.len());
            let pesieve_suspicious = dynamic_results
                .and_then(pe_sieve_findings)
                .map_or(0, |p| p.total_suspicious);

            if yara_matches == 0 && pesieve_suspicious <= 1 {
                score = score.min(65.0);
            }
            if factors.iter().all(|f| !f.to_lowercase().contains("high")) {
                score = score.min(75.0);
            }
            score
        }
    }
}

// ─── YARA ────────────────────────────────────────────────────────────

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 100.0,
        Severity::High => 80.0,
        Severity::Medium => 50.0,
        Severity::Low => 20.0,
        Severity::Info => 5.0,
    }
}

/// YARA score in `0..=100` with one factor per severity present.
///
/// Repeated matches at one severity decay geometrically: the `i`-th extra
/// match adds `w * 0.5^i`.
pub fn yara_risk(findings: &YaraFindings) -> (f64, Vec<String>) {
    if findings.matches.is_empty() {
        return (0.0, Vec::new());
    }

    let mut total = 0.0;
    let mut factors = Vec::new();

    for (severity, count) in findings.severity_counts().into_iter().rev() {
        let weight = severity_weight(severity);
        total += weight;
        total += (1..count).map(|i| weight * 0.5f64.powi(i as i32)).sum::<f64>();

        factors.push(format!(
            "Found {count} {} severity YARA match{}",
            severity.as_upper().to_lowercase(),
            if count > 1 { "es" } else { "" }
        ));
    }

    ((total / 2.0).min(100.0), factors)
}

// ─── PE metadata ─────────────────────────────────────────────────────

/// PE metadata risk in `0..=95`.
pub fn pe_risk(pe: &PeInfo) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut factors = Vec::new();

    let mut high = 0u32;
    let mut critical = 0u32;
    for section in &pe.sections {
        if section.entropy > 7.5 {
            critical += 1;
            factors.push(format!(
                "Critical entropy in section {}: {:.2}",
                section.name, section.entropy
            ));
        } else if section.entropy > 7.0 {
            high += 1;
            factors.push(format!(
                "High entropy in section {}: {:.2}",
                section.name, section.entropy
            ));
        }
    }
    score += f64::from((high * 10 + critical * 20).min(40));

    let lowered: Vec<String> = pe
        .suspicious_imports
        .iter()
        .map(|imp| imp.function.to_lowercase())
        .collect();
    let critical_imports = lowered
        .iter()
        .filter(|f| CRITICAL_PE_IMPORTS.contains(&f.as_str()))
        .count() as u32;
    let high_imports = lowered
        .iter()
        .filter(|f| HIGH_RISK_PE_IMPORTS.contains(&f.as_str()))
        .count() as u32;
    score += f64::from((critical_imports * 15 + high_imports * 8).min(30));
    if critical_imports > 0 || high_imports > 0 {
        factors.push(format!(
            "Found {critical_imports} critical process manipulation and {high_imports} high-risk dynamic loading imports"
        ));
    }

    if pe.checksum_penalized() {
        score += 25.0;
        factors.push("PE checksum mismatch detected".to_owned());
    }

    (score, factors)
}

// ─── static ──────────────────────────────────────────────────────────

fn static_risk(results: &ScanResults, file_entropy: Option<f64>) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut factors = Vec::new();

    if let Some(yara) = yara_findings(results) {
        let (yara_score, yara_factors) = yara_risk(yara);
        if yara_score > 0.0 {
            let multiplier = (yara.matches.len() as f64 * 0.15 + 1.0).min(1.5);
            score += yara_score * multiplier;
            factors.extend(yara_factors);
        }
    }

    if let Some(checkplz) = checkplz_findings(results) {
        if checkplz.initial_threat {
            score += 50.0;
            factors.push("Critical: CheckPLZ detected initial threat indicators".to_owned());
        }
        let indicators = checkplz.indicators.len();
        if indicators > 0 {
            score += (indicators as f64 * 15.0).min(40.0);
            factors.push(format!("Found {indicators} additional threat indicators"));
        }
    }

    if let Some(entropy) = file_entropy {
        if entropy > 7.5 {
            score += 30.0;
            factors.push(format!("Critical overall file entropy: {entropy:.2}"));
        } else if entropy > 7.0 {
            score += 20.0;
            factors.push(format!("High overall file entropy: {entropy:.2}"));
        }
    }

    (score, factors)
}

// ─── dynamic ─────────────────────────────────────────────────────────

fn dynamic_risk(results: &ScanResults, profile: RiskProfile) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut factors = Vec::new();

    if let Some(yara) = yara_findings(results) {
        let (yara_score, yara_factors) = yara_risk(yara);
        if yara_score > 0.0 {
            score += yara_score;
            factors.extend(yara_factors);
        }
    }

    if let Some(pesieve) = pe_sieve_findings(results) {
        score += pe_sieve_risk(pesieve, profile, &mut factors);
    }
    if let Some(moneta) = moneta_counters(results) {
        score += memory_anomaly_risk(moneta, profile, &mut factors);
    }
    if let Some(patriot) = patriot_findings(results) {
        score += behavior_risk(patriot, profile, &mut factors);
    }
    if let Some(hsb) = hsb_findings(results) {
        score += sleeping_beacon_risk(hsb, profile, &mut factors);
    }
    if let Some(rededr) = rededr_findings(results) {
        score += etw_risk(rededr, &mut factors);
    }

    (score, factors)
}

fn pe_sieve_risk(findings: &PeSieveFindings, profile: RiskProfile, factors: &mut Vec<String>) -> f64 {
    let suspicious = findings.total_suspicious;
    if suspicious == 0 {
        return 0.0;
    }
    let multiplier = if findings.severity == Severity::Critical {
        1.5
    } else {
        1.0
    };
    let (per_hit, cap) = if profile.is_file() {
        (20.0, 45.0)
    } else {
        (15.0, 30.0)
    };
    factors.push(format!("PE-Sieve found {suspicious} suspicious indicators"));
    (suspicious as f64 * per_hit * multiplier).min(cap)
}

fn memory_anomaly_risk(
    counters: &MonetaCounters,
    profile: RiskProfile,
    factors: &mut Vec<String>,
) -> f64 {
    let file = profile.is_file();
    let weighted = [
        (counters.private_rwx, if file { 15 } else { 10 }),
        (counters.modified_code, if file { 12 } else { 10 }),
        (counters.heap_executable, 10),
        (counters.modified_pe_header, 10),
        (counters.private_rx, 8),
        (counters.inconsistent_x, 8),
        (counters.missing_peb, 5),
        (counters.mismatching_peb, 5),
    ];

    let mut total = 0u64;
    let mut anomalies = 0u64;
    for (count, weight) in weighted {
        if count > 0 {
            total += (count * weight).min(weight * 2);
            anomalies += count;
        }
    }

    if anomalies == 0 {
        return 0.0;
    }
    factors.push(format!("Found {anomalies} weighted memory anomalies"));
    total.min(if file { 40 } else { 30 }) as f64
}

fn behavior_risk(findings: &PatriotFindings, profile: RiskProfile, factors: &mut Vec<String>) -> f64 {
    if findings.findings.is_empty() {
        return 0.0;
    }
    let score: u32 = findings
        .findings
        .iter()
        .map(|f| match f.severity {
            Severity::Critical if profile.is_file() => 25,
            Severity::Critical => 20,
            Severity::High => 15,
            Severity::Medium => 10,
            Severity::Low | Severity::Info => 5,
        })
        .sum();
    factors.push(format!(
        "Found {} weighted suspicious behaviors",
        findings.findings.len()
    ));
    f64::from(score.min(35))
}

fn sleeping_beacon_risk(findings: &HsbFindings, profile: RiskProfile, factors: &mut Vec<String>) -> f64 {
    let mut total = 0.0;
    for detection in &findings.detections {
        if detection.findings.is_empty() {
            continue;
        }
        let count = detection.findings.len() as f64;
        let severity = detection.max_severity;

        let detection_score = if profile.is_file() {
            (count * 15.0 * (1.0 + f64::from(severity) * 0.5)).min(40.0)
        } else {
            let (per_finding, cap) = match severity {
                1 => (15.0, 25.0),
                2 => (20.0, 35.0),
                _ => (10.0, 20.0),
            };
            (count * per_finding).min(cap)
        };
        total += detection_score;

        if severity >= 2 {
            factors.push(format!(
                "Critical: Found {} high-severity memory operations",
                detection.findings.len()
            ));
        } else {
            let label = if severity == 1 { "MID" } else { "LOW" };
            factors.push(format!(
                "Found {} {label} severity memory operations",
                detection.findings.len()
            ));
        }
    }
    total.min(if profile.is_file() { 45.0 } else { 35.0 })
}

fn etw_risk(findings: &RedEdrFindings, factors: &mut Vec<String>) -> f64 {
    let suspicious = findings.suspicious.len();
    if suspicious == 0 {
        return 0.0;
    }
    factors.push(format!("RedEdr recorded {suspicious} suspicious ETW events"));
    (suspicious as f64 * 5.0).min(20.0)
}

// ─── lookups ─────────────────────────────────────────────────────────

fn find_findings<'a, T>(
    results: &'a ScanResults,
    pick: impl Fn(&'a ScanFindings) -> Option<&'a T>,
) -> Option<&'a T> {
    results
        .values()
        .filter_map(|r| r.findings.as_ref())
        .find_map(pick)
}

pub(crate) fn yara_findings(results: &ScanResults) -> Option<&YaraFindings> {
    find_findings(results, |f| match f {
        ScanFindings::Yara(y) => Some(y),
        _ => None,
    })
}

fn checkplz_findings(results: &ScanResults) -> Option<&CheckPlzFindings> {
    find_findings(results, |f| match f {
        ScanFindings::CheckPlz(c) => Some(c),
        _ => None,
    })
}

pub(crate) fn pe_sieve_findings(results: &ScanResults) -> Option<&PeSieveFindings> {
    find_findings(results, |f| match f {
        ScanFindings::PeSieve(p) => Some(p),
        _ => None,
    })
}

pub(crate) fn moneta_counters(results: &ScanResults) -> Option<&MonetaCounters> {
    find_findings(results, |f| match f {
        ScanFindings::Moneta(m) => Some(&m.counters),
        _ => None,
    })
}

pub(crate) fn patriot_findings(results: &ScanResults) -> Option<&PatriotFindings> {
    find_findings(results, |f| match f {
        ScanFindings::Patriot(p) => Some(p),
        _ => None,
    })
}

pub(crate) fn hsb_findings(results: &ScanResults) -> Option<&HsbFindings> {
    find_findings(results, |f| match f {
        ScanFindings::Hsb(h) => Some(h),
        _ => None,
    })
}

pub(crate) fn rededr_findings(results: &ScanResults) -> Option<&RedEdrFindings> {
    find_findings(results, |f| match f {
        ScanFindings::RedEdr(r) => Some(r),
        _ => None,
    })
}
