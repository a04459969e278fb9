//! Hunt-Sleeping-Beacons output parser.

use litterbox_core::findings::{HsbDetection, HsbFinding, HsbFindings, ScanFindings};
use litterbox_core::types::{Detection, Severity};
use serde_json::Value;

use super::json::{as_text, as_u64, first_object};
use super::{ParseError, Parsed};

/// Tool severity (0 low, 1 medium, 2 high) as a detection severity.
fn severity(level: u8) -> Severity {
    match level {
        0 => Severity::Low,
        1 => Severity::Medium,
        _ => Severity::High,
    }
}

/// Parse `--json` output, or fall back to the text report where each finding
/// line starts with `!`.
pub fn parse(text: &str) -> Result<Parsed, ParseError> {
    let detections = match first_object(text) {
        Some(obj) => from_json(&obj)?,
        None => from_text(text),
    };

    let normalized = detections
        .iter()
        .flat_map(|d| {
            let who = match (&d.process_name, d.pid) {
                (Some(name), Some(pid)) => format!("{name} ({pid})"),
                (None, Some(pid)) => pid.to_string(),
                (Some(name), None) => name.clone(),
                (None, None) => "process".to_owned(),
            };
            d.findings.iter().map(move |f| {
                Detection::new(
                    format!("hsb_{}", f.kind),
                    severity(f.severity),
                    format!("{who}: {}", f.description),
                )
            })
        })
        .collect();

    Ok(Parsed {
        detections: normalized,
        findings: ScanFindings::Hsb(HsbFindings { detections }),
    })
}

fn from_json(obj: &Value) -> Result<Vec<HsbDetection>, ParseError> {
    let items = match obj.get("detections") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ParseError::new("hsb detections is not an array")),
    };

    items
        .iter()
        .map(|item| {
            let findings: Vec<HsbFinding> = item
                .get("findings")
                .and_then(Value::as_array)
                .map(|fs| fs.iter().map(finding_from_json).collect())
                .unwrap_or_default();
            let derived_max = findings.iter().map(|f| f.severity).max().unwrap_or(0);
            let max_severity = item
                .get("max_severity")
                .and_then(as_u64)
                .map(clamp_level)
                .unwrap_or(derived_max);

            Ok(HsbDetection {
                pid: item.get("pid").and_then(as_u64).and_then(|p| u32::try_from(p).ok()),
                process_name: item
                    .get("process_name")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                max_severity,
                findings,
            })
        })
        .collect()
}

fn finding_from_json(value: &Value) -> HsbFinding {
    HsbFinding {
        kind: value
            .get("type")
            .map(as_text)
            .unwrap_or_else(|| "unknown".to_owned()),
        severity: value.get("severity").and_then(as_u64).map(clamp_level).unwrap_or(1),
        description: value.get("description").map(as_text).unwrap_or_default(),
    }
}

fn clamp_level(level: u64) -> u8 {
    level.min(2) as u8
}

fn from_text(text: &str) -> Vec<HsbDetection> {
    let findings: Vec<HsbFinding> = text
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('!'))
        .map(|rest| HsbFinding {
            kind: "text".to_owned(),
            severity: 1,
            description: rest.trim().to_owned(),
        })
        .collect();

    if findings.is_empty() {
        return Vec::new();
    }
    vec![HsbDetection {
        pid: None,
        process_name: None,
        max_severity: 1,
        findings,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hsb(parsed: &Parsed) -> &HsbFindings {
        match &parsed.findings {
            ScanFindings::Hsb(f) => f,
            other => panic!("expected hsb findings, got {other:?}"),
        }
    }

    #[test]
    fn json_detections() {
        let text = r#"{"detections": [{
            "pid": 4242, "process_name": "payload.exe", "max_severity": 2,
            "findings": [
                {"type": "ntdll_sleep_hook", "severity": 2, "description": "abnormal return address"},
                {"type": "blocking_timer", "severity": 1, "description": "thread blocked on timer"}
            ]
        }]}"#;
        let parsed = parse(text).unwrap();
        let f = hsb(&parsed);
        assert_eq!(f.detections.len(), 1);
        let d = &f.detections[0];
        assert_eq!(d.pid, Some(4242));
        assert_eq!(d.max_severity, 2);
        assert_eq!(d.findings.len(), 2);
        assert_eq!(parsed.detections.len(), 2);
        assert_eq!(parsed.detections[0].severity, Severity::High);
        assert!(parsed.detections[0].note.starts_with("payload.exe (4242)"));
    }

    #[test]
    fn max_severity_derived_when_absent() {
        let parsed = parse(r#"{"detections": [{"findings": [{"type": "t", "severity": 0}]}]}"#)
            .unwrap();
        assert_eq!(hsb(&parsed).detections[0].max_severity, 0);
    }

    #[test]
    fn out_of_range_levels_are_clamped() {
        let parsed = parse(r#"{"detections": [{"max_severity": 9, "findings": []}]}"#).unwrap();
        assert_eq!(hsb(&parsed).detections[0].max_severity, 2);
    }

    #[test]
    fn text_fallback() {
        let text = "* Hunt-Sleeping-Beacons\n! Suspicious wait reason: DelayExecution\n! Return address in private memory\n";
        let parsed = parse(text).unwrap();
        let f = hsb(&parsed);
        assert_eq!(f.detections.len(), 1);
        assert_eq!(f.detections[0].findings.len(), 2);
        assert_eq!(f.detections[0].max_severity, 1);
    }

    #[test]
    fn nothing_found() {
        assert!(hsb(&parse("").unwrap()).detections.is_empty());
        assert!(hsb(&parse(r#"{"detections": []}"#).unwrap()).detections.is_empty());
    }

    #[test]
    fn detections_must_be_array() {
        assert!(parse(r#"{"detections": "none"}"#).is_err());
    }
}
