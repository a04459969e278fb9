//! YARA text output parser.
//!
//! `yara -s -m` prints one header line per matching rule, followed by one line
//! per matched string:
//!
//! ```text
//! Suspicious_Loader [author="lab",severity="high",score=80] C:\samples\a.exe
//! 0x1a2f:$api_1: VirtualAlloc
//! 0x2000: MZ
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use litterbox_core::findings::{ScanFindings, YaraFindings, YaraMatch, YaraString};
use litterbox_core::types::{Detection, Severity};
use regex::Regex;
use tracing::warn;

use super::{ParseError, Parsed};

static RULE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:\s+\[(.*)\])?\s+(.+)$").expect("valid rule line regex")
});

static META_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^,\s]+?)\s*=\s*(?:"([^"]*)"|(\d+)|([^,\s]+))"#).expect("valid metadata regex")
});

static STRING_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*").expect("valid string separator regex"));

/// First words of lines yara prints about itself rather than about a match.
const DIAGNOSTIC_WORDS: &[&str] = &["error", "warning", "yara"];

/// Parse `yara -s -m` output.
///
/// Parsing is best effort: tool diagnostics are skipped, and a line that is
/// neither a rule header nor a string of the current rule is logged and
/// dropped. Output with no matches and at least one unreadable line is an
/// error.
pub fn parse(text: &str) -> Result<Parsed, ParseError> {
    let mut matches: Vec<YaraMatch> = Vec::new();
    // Whether string lines belong to the last entry in `matches`.
    let mut in_rule = false;
    let mut unreadable: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() || is_diagnostic(line) {
            continue;
        }

        if line.starts_with("0x") {
            match (in_rule, matches.last_mut()) {
                (true, Some(current)) => match parse_string_line(line) {
                    Ok(string) => current.strings.push(string),
                    Err(e) => {
                        warn!(line, error = %e, "skipping malformed yara string line");
                        unreadable.get_or_insert_with(|| line.to_owned());
                    }
                },
                _ => {
                    warn!(line, "skipping yara string line without a rule");
                    unreadable.get_or_insert_with(|| line.to_owned());
                }
            }
            continue;
        }

        match parse_rule_line(line) {
            Some(m) => {
                matches.push(m);
                in_rule = true;
            }
            None => {
                warn!(line, "skipping unrecognized yara line");
                unreadable.get_or_insert_with(|| line.to_owned());
                in_rule = false;
            }
        }
    }

    if let (true, Some(line)) = (matches.is_empty(), unreadable) {
        return Err(ParseError::new(format!("unrecognized yara line: {line}")));
    }

    let detections = matches
        .iter()
        .map(|m| {
            let note = m
                .metadata
                .get("description")
                .cloned()
                .unwrap_or_else(|| format!("{} string match(es) in {}", m.strings.len(), m.target));
            Detection::new(&m.rule, m.severity, note)
        })
        .collect();

    Ok(Parsed {
        detections,
        findings: ScanFindings::Yara(YaraFindings { matches }),
    })
}

fn is_diagnostic(line: &str) -> bool {
    line.split_whitespace().next().is_some_and(|word| {
        let word = word.trim_end_matches(':').to_ascii_lowercase();
        DIAGNOSTIC_WORDS.contains(&word.as_str())
    })
}

/// A rule header. Without a metadata block the target must be a single path
/// or pid, which keeps free-form messages from reading as matches.
fn parse_rule_line(line: &str) -> Option<YaraMatch> {
    let caps = RULE_LINE.captures(line)?;
    let target = caps[3].trim().to_owned();
    let metadata = match caps.get(2) {
        Some(m) => parse_metadata(m.as_str()),
        None if target.split_whitespace().nth(1).is_some() => return None,
        None => BTreeMap::new(),
    };
    Some(YaraMatch {
        rule: caps[1].to_owned(),
        severity: severity_from_metadata(&metadata),
        target,
        metadata,
        strings: Vec::new(),
    })
}

fn parse_metadata(meta: &str) -> BTreeMap<String, String> {
    META_PAIR
        .captures_iter(meta)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_owned();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))?
                .as_str()
                .to_owned();
            Some((key, value))
        })
        .collect()
}

fn parse_string_line(line: &str) -> Result<YaraString, ParseError> {
    let parts: Vec<&str> = STRING_SPLIT.splitn(line, 3).collect();
    let offset_text = parts[0].trim_start_matches("0x");
    let offset = u64::from_str_radix(offset_text, 16)
        .map_err(|_| ParseError::new(format!("bad string offset: {}", parts[0])))?;

    let (identifier, data) = match parts.as_slice() {
        [_, id, data] if id.starts_with('$') => ((*id).to_owned(), (*data).to_owned()),
        [_, first, rest] => ("unnamed_string".to_owned(), format!("{first}:{rest}")),
        [_, data] => ("unnamed_string".to_owned(), (*data).to_owned()),
        _ => ("unnamed_string".to_owned(), String::new()),
    };

    Ok(YaraString {
        offset,
        identifier,
        data,
    })
}

/// `severity` wins over `score`; names and 0-100 numbers are both accepted.
fn severity_from_metadata(meta: &BTreeMap<String, String>) -> Severity {
    let from_value = |v: &String| {
        v.parse::<u32>()
            .ok()
            .map(Severity::from_score)
            .or_else(|| Severity::from_str_loose(v))
    };
    meta.get("severity")
        .and_then(from_value)
        .or_else(|| meta.get("score").and_then(from_value))
        .unwrap_or(Severity::Medium)
}
