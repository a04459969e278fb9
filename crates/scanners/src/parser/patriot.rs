//! Patriot (in-memory stealth technique scanner) output parser.
//!
//! One finding per line:
//!
//! ```text
//! Level: high | Type: suspicious_thread | PID: 4242 | Details: start address in private memory
//! ```

use litterbox_core::findings::{PatriotFinding, PatriotFindings, ScanFindings};
use litterbox_core::types::{Detection, Severity};

use super::{ParseError, Parsed};

/// Parse Patriot output. Lines without a `Level:` field are banner or
/// progress text and are skipped.
pub fn parse(text: &str) -> Result<Parsed, ParseError> {
    let findings: Vec<PatriotFinding> = text.lines().filter_map(parse_line).collect();

    let detections = findings
        .iter()
        .map(|f| {
            let note = match f.pid {
                Some(pid) => format!("pid {pid}: {}", f.details),
                None => f.details.clone(),
            };
            Detection::new(format!("patriot_{}", f.kind), f.severity, note)
        })
        .collect();

    Ok(Parsed {
        detections,
        findings: ScanFindings::Patriot(PatriotFindings { findings }),
    })
}

fn parse_line(line: &str) -> Option<PatriotFinding> {
    let mut level = None;
    let mut kind = None;
    let mut pid = None;
    let mut details = None;

    for field in line.split('|') {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "level" => level = Some(value),
            "type" => kind = Some(value),
            "pid" => pid = value.parse().ok(),
            "details" => details = Some(value),
            _ => {}
        }
    }

    let level = level?;
    Some(PatriotFinding {
        severity: Severity::from_str_loose(level).unwrap_or(Severity::Medium),
        kind: kind.unwrap_or("unknown").to_owned(),
        pid,
        details: details.unwrap_or_default().to_owned(),
    })
}
