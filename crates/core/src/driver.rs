//! BYOVD (bring-your-own-vulnerable-driver) findings and outcomes.
//!
//! The numeric score and the verdict are computed independently by the risk
//! crate; this module only defines their shapes. [`ByovdLabel`] bands are
//! deliberately separate from [`crate::types::RiskLevel`]: a higher BYOVD
//! score means more useful for exploitation, not more dangerous-looking.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Flags derived from a driver's imports and the reference lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByovdFindings {
    pub is_loldriver: bool,
    pub is_win10_blocked: bool,
    pub is_win11_blocked: bool,
    pub has_dangerous_imports: bool,
    pub critical_imports: Vec<String>,
}

/// BYOVD score band: `>=70` HIGH, `>=40` MEDIUM, else LOW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ByovdLabel {
    Low,
    Medium,
    High,
}

impl fmt::Display for ByovdLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Driver classification, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverVerdict {
    #[serde(rename = "HolyGrail")]
    HolyGrail,
    #[serde(rename = "Known Vulnerable Driver")]
    KnownVulnerableDriver,
    #[serde(rename = "Blocked Driver")]
    BlockedDriver,
    #[serde(rename = "Potentially Interesting")]
    PotentiallyInteresting,
    #[serde(rename = "Low Risk Driver")]
    LowRiskDriver,
}

impl DriverVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HolyGrail => "HolyGrail",
            Self::KnownVulnerableDriver => "Known Vulnerable Driver",
            Self::BlockedDriver => "Blocked Driver",
            Self::PotentiallyInteresting => "Potentially Interesting",
            Self::LowRiskDriver => "Low Risk Driver",
        }
    }
}

impl fmt::Display for DriverVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Findings plus the score, label and verdict derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByovdAssessment {
    pub byovd_findings: ByovdFindings,
    pub score: u8,
    pub label: ByovdLabel,
    pub verdict: DriverVerdict,
}
