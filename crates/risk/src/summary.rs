//! Detection count summaries and the entropy label shown next to a target.

use serde::{Deserialize, Serialize};

use litterbox_core::types::RiskLevel;

use crate::general::{
    ScanResults, hsb_findings, moneta_counters, patriot_findings, pe_sieve_findings,
    rededr_findings, yara_findings,
};

/// Per-tool detection counts for one result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionCounts {
    /// Distinct YARA rules that matched.
    pub yara: usize,
    pub pesieve: u64,
    /// Moneta anomalies, excluding region and unsigned-module inventory.
    pub moneta: u64,
    pub patriot: usize,
    pub hsb: usize,
    pub rededr: usize,
}

impl DetectionCounts {
    pub fn total(&self) -> u64 {
        self.yara as u64
            + self.pesieve
            + self.moneta
            + self.patriot as u64
            + self.hsb as u64
            + self.rededr as u64
    }
}

/// Count detections per tool.
pub fn detection_counts(results: &ScanResults) -> DetectionCounts {
    let yara = yara_findings(results).map_or(0, |y| {
        let mut rules: Vec<&str> = y.matches.iter().map(|m| m.rule.as_str()).collect();
        rules.sort_unstable();
        rules.dedup();
        rules.len()
    });

    DetectionCounts {
        yara,
        pesieve: pe_sieve_findings(results).map_or(0, |p| p.total_suspicious),
        moneta: moneta_counters(results).map_or(0, |m| m.total_anomalies()),
        patriot: patriot_findings(results).map_or(0, |p| p.findings.len()),
        hsb: hsb_findings(results).map_or(0, |h| {
            h.detections.iter().map(|d| d.findings.len()).sum()
        }),
        rededr: rededr_findings(results).map_or(0, |r| r.suspicious.len()),
    }
}

/// `>7.2` High, `>6.8` Medium, else Low.
pub fn entropy_risk(entropy: f64) -> RiskLevel {
    if entropy > 7.2 {
        RiskLevel::High
    } else if entropy > 6.8 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
