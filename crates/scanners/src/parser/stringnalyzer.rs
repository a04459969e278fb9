//! Stringnalyzer (categorized string extraction) output parser.

use std::collections::BTreeMap;

use litterbox_core::findings::{ScanFindings, StringFindings};
use litterbox_core::types::{Detection, Severity};
use serde_json::Value;

use super::json::{as_text, first_object};
use super::{ParseError, Parsed};

/// Categories that become detections, with their severity.
const DETECTION_CATEGORIES: &[(&str, Severity)] = &[
    ("suspicious_apis", Severity::High),
    ("commands", Severity::High),
    ("crypto", Severity::Medium),
    ("urls", Severity::Low),
    ("ips", Severity::Low),
    ("registry", Severity::Low),
];

/// Parse a Stringnalyzer JSON report: an object of category → string list,
/// optionally nested under `findings`. Scalar values are ignored.
pub fn parse(text: &str) -> Result<Parsed, ParseError> {
    if text.trim().is_empty() {
        return Ok(Parsed {
            detections: Vec::new(),
            findings: ScanFindings::Stringnalyzer(StringFindings::default()),
        });
    }

    let obj = first_object(text)
        .ok_or_else(|| ParseError::new("no JSON object in stringnalyzer output"))?;
    let root = match obj.get("findings") {
        Some(inner @ Value::Object(_)) => inner,
        _ => &obj,
    };
    let Value::Object(map) = root else {
        return Err(ParseError::new("stringnalyzer findings is not an object"));
    };

    let categories: BTreeMap<String, Vec<String>> = map
        .iter()
        .filter_map(|(category, value)| match value {
            Value::Array(items) => Some((category.clone(), items.iter().map(as_text).collect())),
            _ => None,
        })
        .collect();

    let detections = DETECTION_CATEGORIES
        .iter()
        .filter_map(|(category, severity)| {
            let items = categories.get(*category).filter(|v| !v.is_empty())?;
            let preview: Vec<&str> = items.iter().take(5).map(String::as_str).collect();
            Some(Detection::new(
                *category,
                *severity,
                format!("{} string(s): {}", items.len(), preview.join(", ")),
            ))
        })
        .collect();

    Ok(Parsed {
        detections,
        findings: ScanFindings::Stringnalyzer(StringFindings { categories }),
    })
}
