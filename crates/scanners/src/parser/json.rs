//! JSON extraction from noisy tool output.
//!
//! Several tools print a banner or progress lines around their JSON report.
//! [`extract_object`] finds the first balanced `{ ... }` block, honoring
//! string literals and escapes, so braces inside strings do not confuse it.

use serde_json::Value;

/// First balanced JSON object in `text`, if any.
pub fn extract_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&bytes[start..]) {
            return Some(&text[start..start + end]);
        }
        search_from = start + 1;
    }
    None
}

/// Length of the balanced object starting at `bytes[0] == b'{'`.
fn balanced_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the first JSON object in `text`.
///
/// Candidates that are balanced but not valid JSON are skipped.
pub fn first_object(text: &str) -> Option<Value> {
    let mut rest = text;
    while let Some(candidate) = extract_object(rest) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
            return Some(value);
        }
        // resume after the opening brace of the rejected candidate
        let consumed = candidate.as_ptr() as usize - rest.as_ptr() as usize + 1;
        rest = &rest[consumed..];
    }
    None
}

/// Integer from a number or a numeric string.
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Display text for an arbitrary JSON value: strings unquoted, the rest compact.
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
