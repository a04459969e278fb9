//! Typed parser output for each wrapped scanner.
//!
//! Detections are the uniform view shown to users; these structures keep the
//! tool-specific numbers that risk scoring needs (Moneta counters, PE-sieve
//! totals, Hunt-Sleeping-Beacons severities and so on).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Severity;

/// Parsed findings, tagged by the tool that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ScanFindings {
    Yara(YaraFindings),
    CheckPlz(CheckPlzFindings),
    Stringnalyzer(StringFindings),
    PeSieve(PeSieveFindings),
    Moneta(MonetaFindings),
    Patriot(PatriotFindings),
    Hsb(HsbFindings),
    RedEdr(RedEdrFindings),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YaraFindings {
    pub matches: Vec<YaraMatch>,
}

impl YaraFindings {
    /// Number of matches at each severity.
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for m in &self.matches {
            *counts.entry(m.severity).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YaraMatch {
    pub rule: String,
    /// File path or pid the rule matched against.
    pub target: String,
    pub severity: Severity,
    pub metadata: BTreeMap<String, String>,
    pub strings: Vec<YaraString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YaraString {
    pub offset: u64,
    pub identifier: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPlzFindings {
    /// Whether the AV engine flagged the file on first submission.
    pub initial_threat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_name: Option<String>,
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringFindings {
    pub categories: BTreeMap<String, Vec<String>>,
}

impl StringFindings {
    pub fn total(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeSieveFindings {
    pub total_scanned: u64,
    pub total_suspicious: u64,
    pub patched: u64,
    pub iat_hooked: u64,
    pub replaced: u64,
    pub hdr_modified: u64,
    pub implanted_pe: u64,
    pub implanted_shc: u64,
    pub unreachable_file: u64,
    pub other: u64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonetaFindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<MonetaProcess>,
    pub counters: MonetaCounters,
    pub regions: Vec<MonetaRegion>,
    /// Thread ids (hex) referenced by suspicious regions.
    pub threads: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaProcess {
    pub name: String,
    pub pid: u32,
    pub arch: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaCounters {
    pub total_regions: u64,
    pub private_rx: u64,
    pub private_rwx: u64,
    pub abnormal_private_exec: u64,
    pub heap_executable: u64,
    pub modified_code: u64,
    pub modified_pe_header: u64,
    pub inconsistent_x: u64,
    pub unsigned_modules: u64,
    pub missing_peb: u64,
    pub mismatching_peb: u64,
}

impl MonetaCounters {
    /// Sum of the anomaly counters. Region and unsigned-module totals are
    /// inventory, not detections.
    pub fn total_anomalies(&self) -> u64 {
        self.private_rx
            + self.private_rwx
            + self.abnormal_private_exec
            + self.heap_executable
            + self.modified_code
            + self.modified_pe_header
            + self.inconsistent_x
            + self.missing_peb
            + self.mismatching_peb
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaRegion {
    pub description: String,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatriotFindings {
    pub findings: Vec<PatriotFinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatriotFinding {
    pub severity: Severity,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsbFindings {
    pub detections: Vec<HsbDetection>,
}

/// Hunt-Sleeping-Beacons findings for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsbDetection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    /// Highest tool severity among `findings`: 0 low, 1 medium, 2 high.
    pub max_severity: u8,
    pub findings: Vec<HsbFinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsbFinding {
    pub kind: String,
    pub severity: u8,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedEdrFindings {
    pub total_events: u64,
    pub suspicious: Vec<RedEdrEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedEdrEvent {
    pub kind: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findings_are_tagged_by_tool() {
        let findings = ScanFindings::PeSieve(PeSieveFindings {
            total_suspicious: 2,
            ..Default::default()
        });
        let json = serde_json::to_value(&findings).unwrap();
        assert_eq!(json["tool"], "pe_sieve");
        assert_eq!(json["total_suspicious"], 2);

        let back: ScanFindings = serde_json::from_value(json).unwrap();
        assert_eq!(back, findings);
    }

    #[test]
    fn yara_severity_counts() {
        let m = |sev| YaraMatch {
            rule: "r".to_owned(),
            target: "t".to_owned(),
            severity: sev,
            metadata: BTreeMap::new(),
            strings: Vec::new(),
        };
        let findings = YaraFindings {
            matches: vec![m(Severity::High), m(Severity::High), m(Severity::Low)],
        };
        let counts = findings.severity_counts();
        assert_eq!(counts.get(&Severity::High), Some(&2));
        assert_eq!(counts.get(&Severity::Low), Some(&1));
        assert_eq!(counts.get(&Severity::Critical), None);
    }

    #[test]
    fn moneta_total_anomalies_excludes_inventory() {
        let counters = MonetaCounters {
            total_regions: 40,
            unsigned_modules: 7,
            private_rwx: 2,
            modified_code: 1,
            ..Default::default()
        };
        assert_eq!(counters.total_anomalies(), 3);
    }
}
