//! BYOVD driver scoring.
//!
//! Score and verdict are two independent functions of the same findings. A
//! driver already on the vulnerable-driver list can score 95 and still not be
//! a HolyGrail; a driver with no dangerous imports scores 55 and is still a
//! low-risk driver.

use litterbox_core::driver::{ByovdAssessment, ByovdFindings, ByovdLabel, DriverVerdict};

/// Exploitability score in `0..=100`.
///
/// Blocked by both OS block lists is a terminal veto: the score is 0 whatever
/// the other flags say.
pub fn byovd_score(findings: &ByovdFindings) -> u8 {
    if findings.is_win10_blocked && findings.is_win11_blocked {
        return 0;
    }

    let mut score: i32 = 0;
    if findings.has_dangerous_imports {
        score += 55;
    }
    score += if findings.is_win11_blocked { -50 } else { 25 };
    score += if findings.is_win10_blocked { -20 } else { 20 };
    score += if findings.is_loldriver { -5 } else { 10 };

    // clamp keeps the cast lossless
    score.clamp(0, 100) as u8
}

/// `>=70` HIGH, `>=40` MEDIUM, else LOW.
pub fn byovd_label(score: u8) -> ByovdLabel {
    match score {
        70.. => ByovdLabel::High,
        40..=69 => ByovdLabel::Medium,
        _ => ByovdLabel::Low,
    }
}

/// Driver classification, first matching rule wins.
pub fn driver_verdict(findings: &ByovdFindings) -> DriverVerdict {
    let blocked = findings.is_win10_blocked || findings.is_win11_blocked;

    if findings.has_dangerous_imports && !findings.is_loldriver && !blocked {
        DriverVerdict::HolyGrail
    } else if findings.is_loldriver {
        DriverVerdict::KnownVulnerableDriver
    } else if blocked {
        DriverVerdict::BlockedDriver
    } else if findings.has_dangerous_imports {
        DriverVerdict::PotentiallyInteresting
    } else {
        DriverVerdict::LowRiskDriver
    }
}

/// Score, label and verdict for one driver.
pub fn assess_driver(findings: ByovdFindings) -> ByovdAssessment {
    let score = byovd_score(&findings);
    let label = byovd_label(score);
    let verdict = driver_verdict(&findings);
    tracing::debug!(score, %label, %verdict, "driver assessed");
    ByovdAssessment {
        byovd_findings: findings,
        score,
        label,
        verdict,
    }
}
