//! CheckPlz (AV engine probe) output parser.

use litterbox_core::findings::{CheckPlzFindings, ScanFindings};
use litterbox_core::types::{Detection, Severity};
use serde_json::Value;

use super::json::{as_text, first_object};
use super::{ParseError, Parsed};

/// Parse a CheckPlz report.
///
/// The report is the first JSON object in `text`; it may also sit under a
/// top-level `findings` key. Without JSON, lines mentioning "threat" are
/// taken as indicators and mark the file as flagged.
pub fn parse(text: &str) -> Result<Parsed, ParseError> {
    let findings = match first_object(text) {
        Some(obj) => from_json(&obj)?,
        None => from_text(text),
    };

    let mut detections = Vec::new();
    if findings.initial_threat {
        let name = findings
            .threat_name
            .clone()
            .unwrap_or_else(|| "flagged by AV engine".to_owned());
        detections.push(Detection::new("checkplz_initial_threat", Severity::High, name));
    }
    detections.extend(
        findings
            .indicators
            .iter()
            .map(|ind| Detection::new("checkplz_indicator", Severity::Medium, ind)),
    );

    Ok(Parsed {
        detections,
        findings: ScanFindings::CheckPlz(findings),
    })
}

fn from_json(obj: &Value) -> Result<CheckPlzFindings, ParseError> {
    let root = match obj.get("findings") {
        Some(inner @ Value::Object(_)) => inner,
        _ => obj,
    };

    let (initial_threat, mut threat_name) = match root.get("initial_threat") {
        None | Some(Value::Null) => (false, None),
        Some(Value::Bool(b)) => (*b, None),
        Some(Value::String(s)) => {
            let flagged = !s.trim().is_empty() && !s.eq_ignore_ascii_case("false");
            (flagged, flagged.then(|| s.clone()))
        }
        Some(Value::Object(o)) => {
            let name = o.get("name").or_else(|| o.get("threat")).map(as_text);
            (true, name)
        }
        Some(other) => {
            return Err(ParseError::new(format!(
                "unexpected initial_threat value: {other}"
            )));
        }
    };
    if threat_name.is_none() {
        threat_name = root.get("threat_name").and_then(Value::as_str).map(str::to_owned);
    }

    let indicators = match root.get("threat_indicators") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(as_text).collect(),
        Some(other) => vec![as_text(other)],
    };

    Ok(CheckPlzFindings {
        initial_threat,
        threat_name,
        indicators,
    })
}

fn from_text(text: &str) -> CheckPlzFindings {
    let indicators: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| line.to_ascii_lowercase().contains("threat"))
        .map(str::to_owned)
        .collect();
    CheckPlzFindings {
        initial_threat: !indicators.is_empty(),
        threat_name: None,
        indicators,
    }
}
