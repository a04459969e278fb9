//! PE-sieve JSON report parser.

use litterbox_core::findings::{PeSieveFindings, ScanFindings};
use litterbox_core::types::{Detection, Severity};
use serde::Deserialize;

use super::json::extract_object;
use super::{ParseError, Parsed};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Report {
    scanned: Scanned,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Scanned {
    total: u64,
    modified: Modified,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Modified {
    total: u64,
    patched: u64,
    iat_hooked: u64,
    replaced: u64,
    hdr_modified: u64,
    implanted_pe: u64,
    implanted_shc: u64,
    unreachable_file: u64,
    other: u64,
}

/// Parse the `scan_report.json` PE-sieve writes into its output directory.
pub fn parse(text: &str) -> Result<Parsed, ParseError> {
    if text.trim().is_empty() {
        return Ok(Parsed {
            detections: Vec::new(),
            findings: ScanFindings::PeSieve(PeSieveFindings::default()),
        });
    }

    let json = extract_object(text).ok_or_else(|| ParseError::new("no JSON in pe-sieve report"))?;
    let report: Report = serde_json::from_str(json)
        .map_err(|e| ParseError::new(format!("invalid pe-sieve report: {e}")))?;
    let m = report.scanned.modified;

    let severity = if m.replaced > 0 || m.implanted_pe > 0 || m.implanted_shc > 0 {
        Severity::Critical
    } else if m.total > 0 {
        Severity::High
    } else {
        Severity::Info
    };

    let categories = [
        ("replaced", m.replaced, Severity::Critical),
        ("implanted_pe", m.implanted_pe, Severity::Critical),
        ("implanted_shc", m.implanted_shc, Severity::Critical),
        ("hdr_modified", m.hdr_modified, Severity::High),
        ("patched", m.patched, Severity::High),
        ("iat_hooked", m.iat_hooked, Severity::High),
        ("unreachable_file", m.unreachable_file, Severity::Medium),
        ("other", m.other, Severity::Medium),
    ];
    let detections = categories
        .into_iter()
        .filter(|(_, count, _)| *count > 0)
        .map(|(name, count, sev)| {
            Detection::new(format!("pe_sieve_{name}"), sev, format!("{count} module(s)"))
        })
        .collect();

    Ok(Parsed {
        detections,
        findings: ScanFindings::PeSieve(PeSieveFindings {
            total_scanned: report.scanned.total,
            total_suspicious: m.total,
            patched: m.patched,
            iat_hooked: m.iat_hooked,
            replaced: m.replaced,
            hdr_modified: m.hdr_modified,
            implanted_pe: m.implanted_pe,
            implanted_shc: m.implanted_shc,
            unreachable_file: m.unreachable_file,
            other: m.other,
            severity,
        }),
    })
}
