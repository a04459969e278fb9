#![doc = include_str!("../README.md")]

pub mod byovd;
pub mod general;
pub mod summary;

pub use byovd::{assess_driver, byovd_label, byovd_score, driver_verdict};
pub use general::{RiskProfile, ScanResults, assess, pe_risk, yara_risk};
pub use summary::{DetectionCounts, detection_counts, entropy_risk};
